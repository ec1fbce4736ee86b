//! Discovery significance for counting experiments.
//!
//! - [`binomial_exp_z`] / [`binomial_obs_z`]: the "Zbi" statistic, which treats
//!   the background uncertainty as an auxiliary (off-region) measurement and
//!   reduces the on/off problem to a binomial tail.
//! - [`significance`]: toy-based p-value of an observed count against a
//!   background smeared log-normally by asymmetric uncertainties.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson, StandardNormal};

use hp_core::{Error, Result};

use crate::normal::pvalue_to_significance;

/// Returned by [`significance`] when the down uncertainty exceeds the background.
pub const INVALID_SIGNIFICANCE: f64 = -999.0;

fn zbi(n_on: f64, b: f64, frac_b_uncertainty: f64) -> f64 {
    if !(b > 0.0) || !(frac_b_uncertainty > 0.0) {
        return if n_on > b { f64::INFINITY } else { 0.0 };
    }
    if !(n_on > 0.0) {
        return 0.0;
    }
    let tau = 1.0 / b / (frac_b_uncertainty * frac_b_uncertainty);
    let n_off = b * tau;
    match statrs::function::beta::checked_beta_reg(n_on, n_off + 1.0, 1.0 / (1.0 + tau)) {
        Ok(p) => pvalue_to_significance(p),
        Err(_) => f64::NAN,
    }
}

/// Expected Zbi significance of `s` signal events over `b` background events
/// with relative background uncertainty `frac_b_uncertainty`.
///
/// Degenerate inputs: without background (or without background
/// uncertainty) any signal is infinitely significant and no signal gives 0.
pub fn binomial_exp_z(s: f64, b: f64, frac_b_uncertainty: f64) -> f64 {
    zbi(s + b, b, frac_b_uncertainty)
}

/// Observed Zbi significance of `n_obs` events over `b` expected background.
pub fn binomial_obs_z(n_obs: f64, b: f64, frac_b_uncertainty: f64) -> f64 {
    zbi(n_obs, b, frac_b_uncertainty)
}

/// Options of the toy-based [`significance`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignificanceOptions {
    /// Target relative precision of the p-value.
    pub precision: f64,
    /// Upper limit on the number of toys (bounds the reachable significance).
    pub max_toys: u64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SignificanceOptions {
    fn default() -> Self {
        Self { precision: 0.03, max_toys: 50_000_000, seed: 1234 }
    }
}

/// Toy-based one-sided significance of `n_obs` against `n_bkg ± (up, down)`
/// with default options.
pub fn significance(n_obs: f64, n_bkg: f64, err_up: f64, err_down: f64) -> Result<f64> {
    significance_with(n_obs, n_bkg, err_up, err_down, &SignificanceOptions::default())
}

/// Toy-based significance.
///
/// Each toy draws a background mean from a log-normal around `n_bkg` (upward
/// width from `err_up`, downward from `err_down`; a negative `err_down`
/// means symmetric), then a Poisson count. The p-value counts toys above the
/// observation plus half of those equal to it. Toys are generated until both
/// tails hold `1/precision²` entries or `max_toys` is reached.
///
/// Returns [`INVALID_SIGNIFICANCE`] when `err_down > n_bkg`.
pub fn significance_with(
    n_obs: f64,
    n_bkg: f64,
    err_up: f64,
    err_down: f64,
    opts: &SignificanceOptions,
) -> Result<f64> {
    let err_down = if err_down < 0.0 { err_up } else { err_down };
    if err_down > n_bkg {
        log::warn!("down uncertainty {err_down} exceeds background {n_bkg}");
        return Ok(INVALID_SIGNIFICANCE);
    }
    if !(opts.precision > 0.0) || opts.max_toys == 0 {
        return Err(Error::Validation("significance needs precision > 0 and max_toys > 0".into()));
    }

    let n_min = 1.0 / (opts.precision * opts.precision);
    let n_max = opts.max_toys as f64;
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let (mut below, mut above, mut equal) = (0.0f64, 0.0f64, 0.0f64);

    while below.min(above) + equal < n_min && below + equal + above < n_max {
        let g: f64 = StandardNormal.sample(&mut rng);
        let mu = if n_bkg == 0.0 {
            g.abs() * err_up
        } else if g >= 0.0 {
            n_bkg * (g * (1.0 + err_up / n_bkg).ln()).exp()
        } else if err_down < 0.8 * n_bkg {
            n_bkg * (-g * (1.0 - err_down / n_bkg).ln()).exp()
        } else {
            (n_bkg + g * err_down).max(0.0)
        };
        let count = if mu > 0.0 {
            Poisson::new(mu)
                .map_err(|e| Error::Computation(format!("invalid Poisson mean {mu}: {e}")))?
                .sample(&mut rng)
        } else {
            0.0
        };
        if count > n_obs {
            above += 1.0;
        } else if count == n_obs {
            equal += 1.0;
        } else {
            below += 1.0;
        }
    }

    if above + equal == 0.0 {
        return Ok(pvalue_to_significance(1.0 / n_max));
    }
    if below + equal == 0.0 {
        return Ok(pvalue_to_significance(1.0 - 1.0 / n_max));
    }
    Ok(pvalue_to_significance((above + 0.5 * equal) / (below + equal + above)))
}
