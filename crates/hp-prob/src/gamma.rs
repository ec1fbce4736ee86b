//! Weighted yields as Gamma-distributed counts.
//!
//! A sum of event weights is summarized by an effective number of unweighted
//! entries `n` and a weight per entry `w`, so that the yield is `n·w` and its
//! statistical uncertainty `sqrt(n)·w`. A plain data count is `n = N, w = 1`.

use std::ops::{Add, AddAssign, Mul, MulAssign};

use rand::Rng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};

use hp_core::{Error, Result};

/// Effective entries and weight of a weighted yield.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GammaParams {
    n_effective: f64,
    weight: f64,
}

impl GammaParams {
    /// From effective entries and weight per entry.
    pub fn new(n_effective: f64, weight: f64) -> Self {
        Self { n_effective, weight }
    }

    /// Unweighted count (data).
    pub fn from_count(n: f64) -> Self {
        Self { n_effective: n, weight: 1.0 }
    }

    /// From accumulated `Σw` and `Σw²`.
    pub fn from_sums(sumw: f64, sumw2: f64) -> Self {
        Self::from_yield_and_uncertainty(sumw, sumw2.max(0.0).sqrt())
    }

    /// From a yield and its uncertainty.
    ///
    /// A non-positive yield keeps zero effective entries and stores the
    /// combined magnitude as the weight, so an empty region still carries its
    /// uncertainty scale. A positive yield without uncertainty is taken as an
    /// unweighted count.
    pub fn from_yield_and_uncertainty(yield_value: f64, uncertainty: f64) -> Self {
        if yield_value > 0.0 {
            if uncertainty > 0.0 {
                let n = (yield_value / uncertainty).powi(2);
                Self { n_effective: n, weight: uncertainty * uncertainty / yield_value }
            } else {
                Self { n_effective: yield_value, weight: 1.0 }
            }
        } else {
            Self { n_effective: 0.0, weight: yield_value.hypot(uncertainty) }
        }
    }

    /// Effective number of unweighted entries.
    pub fn n_effective(&self) -> f64 {
        self.n_effective
    }

    /// Weight per effective entry.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Yield `n·w`.
    pub fn yield_value(&self) -> f64 {
        self.n_effective * self.weight
    }

    /// Statistical uncertainty `sqrt(n)·w`.
    pub fn uncertainty(&self) -> f64 {
        self.n_effective.sqrt() * self.weight
    }

    /// Uncertainty with a flat prior, `sqrt(n+1)·w`. Nonzero for empty regions.
    pub fn corrected_uncertainty(&self) -> f64 {
        (self.n_effective + 1.0).sqrt() * self.weight
    }

    /// Relative uncertainty, zero for a zero yield.
    pub fn relative_uncertainty(&self) -> f64 {
        let y = self.yield_value();
        if y == 0.0 { 0.0 } else { self.uncertainty() / y }
    }

    /// Draw a posterior realization of the yield: `Gamma(n + 1, 1)·w`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        let g = Gamma::new(self.n_effective + 1.0, 1.0).map_err(|e| {
            Error::Computation(format!("invalid gamma shape {}: {e}", self.n_effective + 1.0))
        })?;
        Ok(g.sample(rng) * self.weight)
    }
}

impl AddAssign for GammaParams {
    fn add_assign(&mut self, rhs: Self) {
        if self.n_effective == 0.0 && rhs.n_effective == 0.0 {
            self.weight = self.weight.hypot(rhs.weight);
        } else {
            *self = Self::from_yield_and_uncertainty(
                self.yield_value() + rhs.yield_value(),
                self.uncertainty().hypot(rhs.uncertainty()),
            );
        }
    }
}

impl Add for GammaParams {
    type Output = GammaParams;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl MulAssign<f64> for GammaParams {
    fn mul_assign(&mut self, scale: f64) {
        self.weight *= scale;
    }
}

impl Mul<f64> for GammaParams {
    type Output = GammaParams;

    fn mul(mut self, scale: f64) -> Self {
        self *= scale;
        self
    }
}

impl std::iter::Sum for GammaParams {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(GammaParams::default(), |acc, g| acc + g)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn yield_and_uncertainty_round_trip() {
        let g = GammaParams::from_yield_and_uncertainty(40.0, 4.0);
        assert_relative_eq!(g.n_effective(), 100.0);
        assert_relative_eq!(g.weight(), 0.4);
        assert_relative_eq!(g.yield_value(), 40.0);
        assert_relative_eq!(g.uncertainty(), 4.0);
    }

    #[test]
    fn data_count() {
        let g = GammaParams::from_count(9.0);
        assert_relative_eq!(g.uncertainty(), 3.0);
        assert_relative_eq!(g.corrected_uncertainty(), 10.0f64.sqrt());
    }

    #[test]
    fn sums_add_in_quadrature() {
        let a = GammaParams::from_sums(10.0, 4.0);
        let b = GammaParams::from_sums(5.0, 5.0);
        let c = a + b;
        assert_relative_eq!(c.yield_value(), 15.0, epsilon = 1e-12);
        assert_relative_eq!(c.uncertainty(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_regions_keep_weight_scale() {
        let mut a = GammaParams::from_yield_and_uncertainty(0.0, 3.0);
        a += GammaParams::from_yield_and_uncertainty(0.0, 4.0);
        assert_eq!(a.yield_value(), 0.0);
        assert_eq!(a.uncertainty(), 0.0);
        assert_relative_eq!(a.weight(), 5.0);
        assert_relative_eq!(a.corrected_uncertainty(), 5.0);

        let never = GammaParams::default();
        assert_eq!(never.yield_value(), 0.0);
        assert_eq!(never.uncertainty(), 0.0);
    }

    #[test]
    fn scaling_keeps_effective_entries() {
        let g = GammaParams::from_sums(20.0, 10.0) * 3.0;
        assert_relative_eq!(g.n_effective(), 40.0);
        assert_relative_eq!(g.yield_value(), 60.0);
    }

    #[test]
    fn sample_mean_matches_flat_prior() {
        let g = GammaParams::new(20.0, 0.5);
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| g.sample(&mut rng).unwrap()).sum::<f64>() / n as f64;
        assert_relative_eq!(mean, 21.0 * 0.5, max_relative = 0.02);
    }
}
