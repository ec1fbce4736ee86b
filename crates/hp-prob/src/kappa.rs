//! Ratio-of-products ("kappa") estimator with toy-based asymmetric errors.
//!
//! The estimator is `Π_r Y_r^{p_r}` over regions `r` with yields `Y_r` and
//! integer powers `p_r`, e.g. `κ = R2·D3/R1` with powers `{-1, +1, +1}`.
//! Each region yield is a sum of [`GammaParams`] components (one per
//! simulated sample, or a single unweighted count for data).
//!
//! ## Uncertainty convention
//!
//! Every toy replaces each component by `Gamma(n + 1, 1)·w` (flat-prior
//! posterior of a Poisson count), or for data regions the total count `N` by
//! `Gamma(N + 1, 1)`, and recomputes the product. The toys are sorted and a
//! window of `±0.3413·n_toys` ranks (the probability mass between 0 and 1σ of
//! a standard normal on each side) is centered on the rank of the central
//! value. The window ends give the down/up errors. When the central value
//! sits at the toy median this is the 15.87% / 84.13% percentile pair; near
//! the edges of the toy distribution the window slides inwards so it always
//! spans 68.27% of the toys.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;

use hp_core::{Error, Result};

use crate::gamma::GammaParams;
use crate::normal::one_sigma_half_width;

/// Value reported when the central estimate divides by a zero yield.
pub const KAPPA_SENTINEL: f64 = 1e10;

/// One factor of the ratio-of-products estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct KappaTerm {
    /// Yield components, summed.
    pub components: Vec<GammaParams>,
    /// Exponent applied to the summed yield.
    pub power: i32,
    /// Treat the summed yield as an observed count.
    pub is_data: bool,
}

impl KappaTerm {
    /// Simulated region from its per-sample components.
    pub fn mc(components: Vec<GammaParams>, power: i32) -> Self {
        Self { components, power, is_data: false }
    }

    /// Observed region with `n` events.
    pub fn data(n: f64, power: i32) -> Self {
        Self { components: vec![GammaParams::from_count(n)], power, is_data: true }
    }

    /// Central yield `Σ n·w`.
    pub fn yield_value(&self) -> f64 {
        self.components.iter().map(GammaParams::yield_value).sum()
    }
}

/// Toy settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KappaOptions {
    /// Number of toy repetitions.
    pub n_toys: usize,
    /// RNG seed.
    pub seed: u64,
    /// Optional flat relative systematic, applied as a log-normal factor
    /// `exp(N(0, ln(1 + syst)))` per toy.
    pub syst: Option<f64>,
}

impl Default for KappaOptions {
    fn default() -> Self {
        Self { n_toys: 100_000, seed: 1234, syst: None }
    }
}

/// Central value and asymmetric errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KappaResult {
    /// Product of central yields raised to their powers, or [`KAPPA_SENTINEL`].
    pub value: f64,
    /// Lower error. For a non-negative `value`, `value - err_down` is never
    /// negative; a negative `value` (negative-weight simulation) has no lower
    /// error.
    pub err_down: f64,
    /// Upper error.
    pub err_up: f64,
    /// Median of the toys.
    pub median: f64,
    /// Toys kept (excludes 0/0 realizations).
    pub n_toys: usize,
}

impl KappaResult {
    fn unavailable() -> Self {
        Self { value: KAPPA_SENTINEL, err_down: 0.0, err_up: 0.0, median: KAPPA_SENTINEL, n_toys: 0 }
    }

    /// Whether the estimate hit a zero denominator.
    pub fn is_unavailable(&self) -> bool {
        self.value >= KAPPA_SENTINEL
    }
}

/// Product of `yield^power` over terms; `None` for a zero base with negative power.
fn product(yields: impl Iterator<Item = (f64, i32)>) -> Option<f64> {
    let mut out = 1.0;
    let mut zero_denominator = false;
    for (y, p) in yields {
        if y <= 0.0 && p < 0 {
            zero_denominator = true;
        } else {
            out *= y.powi(p);
        }
    }
    if zero_denominator { None } else { Some(out) }
}

/// Compute the estimator and its toy-based errors.
pub fn calc_kappa(terms: &[KappaTerm], opts: &KappaOptions) -> Result<KappaResult> {
    if terms.is_empty() {
        return Err(Error::Validation("kappa needs at least one term".into()));
    }
    if opts.n_toys == 0 {
        return Err(Error::Validation("kappa needs at least one toy".into()));
    }
    let syst = match opts.syst {
        Some(s) if s >= 0.0 => Some(
            Normal::new(0.0, (1.0 + s).ln())
                .map_err(|e| Error::Computation(format!("invalid systematic {s}: {e}")))?,
        ),
        Some(s) => return Err(Error::Validation(format!("systematic must be >= 0, got {s}"))),
        None => None,
    };

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut toys: Vec<f64> = Vec::with_capacity(opts.n_toys);
    let mut toy_yields = vec![0.0; terms.len()];
    for _ in 0..opts.n_toys {
        for (slot, term) in toy_yields.iter_mut().zip(terms) {
            *slot = if term.is_data {
                GammaParams::from_count(term.yield_value()).sample(&mut rng)?
            } else {
                let mut sum = 0.0;
                for c in &term.components {
                    sum += c.sample(&mut rng)?;
                }
                sum
            };
        }
        let factor = match &syst {
            Some(n) => n.sample(&mut rng).exp(),
            None => 1.0,
        };
        match product(toy_yields.iter().copied().zip(terms.iter().map(|t| t.power))) {
            Some(k) => toys.push(k * factor),
            None => {
                // 0/0 carries no information; x/0 is pushed to the far tail.
                let numerator = product(
                    toy_yields
                        .iter()
                        .zip(terms)
                        .filter(|(_, t)| t.power > 0)
                        .map(|(y, t)| (*y, t.power)),
                )
                .unwrap_or(0.0);
                if numerator * factor != 0.0 {
                    toys.push(KAPPA_SENTINEL);
                }
            }
        }
    }

    let central = product(terms.iter().map(|t| (t.yield_value(), t.power)));
    let Some(value) = central else {
        log::warn!("kappa central value divides by a zero yield; reporting sentinel");
        return Ok(KappaResult::unavailable());
    };

    let n = toys.len();
    if n == 0 {
        return Ok(KappaResult { value, err_down: 0.0, err_up: 0.0, median: value, n_toys: 0 });
    }
    toys.sort_by(f64::total_cmp);
    let median = toys[(n + 1) / 2 - 1];

    let half = (one_sigma_half_width() * n as f64) as isize;
    let n = n as isize;
    let rank = toys.partition_point(|k| *k <= value) as isize;
    let mut lo = rank - half;
    let mut hi = rank + half;
    if lo < 0 {
        hi += -lo;
        lo = 0;
    }
    if hi >= n {
        lo -= hi - n + 1;
        hi = n - 1;
    }
    let lo = lo.clamp(0, n - 1) as usize;
    let hi = hi.clamp(0, n - 1) as usize;

    let err_down = (value - toys[lo]).clamp(0.0, value.max(0.0));
    let err_up = (toys[hi] - value).max(0.0);
    Ok(KappaResult { value, err_down, err_up, median, n_toys: n as usize })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn count(n: f64) -> Vec<GammaParams> {
        vec![GammaParams::from_count(n)]
    }

    #[test]
    fn abcd_prediction_from_counts() {
        let terms = [
            KappaTerm::mc(count(50.0), -1),
            KappaTerm::mc(count(20.0), 1),
            KappaTerm::mc(count(10.0), 1),
        ];
        let r = calc_kappa(&terms, &KappaOptions::default()).unwrap();
        assert_relative_eq!(r.value, 4.0, max_relative = 1e-12);
        assert_eq!(r.n_toys, 100_000);
        assert_relative_eq!(r.median, 4.0, max_relative = 0.15);
        assert!(r.err_down > 0.0 && r.err_up > 0.0);
        let rel = 0.5 * (r.err_down + r.err_up) / r.value;
        assert!(rel > 0.3 && rel < 0.6, "relative error {rel}");
        assert!(r.err_up > r.err_down, "ratio of counts is right-skewed");
    }

    #[test]
    fn window_spans_one_sigma_of_toys() {
        let terms = [KappaTerm::mc(count(100.0), 1)];
        let r = calc_kappa(&terms, &KappaOptions { n_toys: 20_000, ..Default::default() }).unwrap();
        // Gamma(101, 1): sd ≈ 10
        assert_relative_eq!(r.err_down + r.err_up, 20.0, max_relative = 0.1);
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let terms = [KappaTerm::mc(vec![GammaParams::new(12.0, 0.3), GammaParams::new(4.0, 1.1)], 1)];
        let opts = KappaOptions { n_toys: 5_000, ..Default::default() };
        assert_eq!(calc_kappa(&terms, &opts).unwrap(), calc_kappa(&terms, &opts).unwrap());
    }

    #[test]
    fn lower_bound_never_negative() {
        let cases: Vec<Vec<KappaTerm>> = vec![
            vec![KappaTerm::mc(count(0.0), 1)],
            vec![KappaTerm::mc(vec![GammaParams::default()], 1), KappaTerm::mc(count(3.0), -1)],
            vec![KappaTerm::mc(count(1.0), 1), KappaTerm::data(0.0, 1)],
            vec![KappaTerm::mc(count(2.0), 1), KappaTerm::mc(count(0.0), -1)],
            vec![
                KappaTerm::mc(count(0.5), -1),
                KappaTerm::mc(count(2.0), 1),
                KappaTerm::data(1.0, 1),
            ],
        ];
        let opts = KappaOptions { n_toys: 5_000, syst: Some(0.2), ..Default::default() };
        for terms in cases {
            let r = calc_kappa(&terms, &opts).unwrap();
            assert!(r.err_down >= 0.0);
            assert!(r.value - r.err_down >= 0.0, "{r:?}");
        }
    }

    #[test]
    fn negative_central_value_has_no_lower_error() {
        let terms = [KappaTerm::mc(vec![GammaParams::new(4.0, -1.0)], 1)];
        let r = calc_kappa(&terms, &KappaOptions { n_toys: 2_000, ..Default::default() }).unwrap();
        assert_relative_eq!(r.value, -4.0, epsilon = 1e-12);
        assert_eq!(r.err_down, 0.0);
        assert!(r.err_up > 0.0, "{r:?}");
    }

    #[test]
    fn zero_denominator_is_sentinel() {
        let terms = [KappaTerm::mc(count(5.0), 1), KappaTerm::mc(vec![GammaParams::default()], -1)];
        let r = calc_kappa(&terms, &KappaOptions { n_toys: 1_000, ..Default::default() }).unwrap();
        assert!(r.is_unavailable());
        assert_eq!(r.value, KAPPA_SENTINEL);
        assert!(r.value.is_finite());
    }

    #[test]
    fn never_populated_region_is_zero_plus_minus_zero() {
        let terms = [KappaTerm::mc(vec![GammaParams::default()], 1)];
        let r = calc_kappa(&terms, &KappaOptions { n_toys: 1_000, ..Default::default() }).unwrap();
        assert_eq!(r.value, 0.0);
        assert_eq!(r.err_down, 0.0);
        assert_eq!(r.err_up, 0.0);
    }

    #[test]
    fn systematic_widens_spread() {
        let terms = [KappaTerm::mc(count(400.0), 1)];
        let base = KappaOptions { n_toys: 20_000, ..Default::default() };
        let a = calc_kappa(&terms, &base).unwrap();
        let b = calc_kappa(&terms, &KappaOptions { syst: Some(0.3), ..base }).unwrap();
        assert!(b.err_up > 2.0 * a.err_up);
    }

    #[test]
    fn invalid_inputs() {
        assert!(calc_kappa(&[], &KappaOptions::default()).is_err());
        let t = [KappaTerm::mc(count(1.0), 1)];
        assert!(calc_kappa(&t, &KappaOptions { n_toys: 0, ..Default::default() }).is_err());
        assert!(calc_kappa(&t, &KappaOptions { syst: Some(-0.1), ..Default::default() }).is_err());
    }
}
