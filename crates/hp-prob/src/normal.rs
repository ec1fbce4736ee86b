//! Standard normal utilities: CDF, quantile, and p-value/significance conversions.

use statrs::distribution::{ContinuousCDF, Normal};

/// Standard normal CDF `Φ(x)`.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * statrs::function::erf::erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal quantile `Φ⁻¹(p)`. Returns `±∞` at the boundaries and NaN
/// outside `[0, 1]`.
pub fn normal_quantile(p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }
    match Normal::new(0.0, 1.0) {
        Ok(n) => n.inverse_cdf(p),
        Err(_) => f64::NAN,
    }
}

/// One-sided significance of a p-value: `Z = Φ⁻¹(1 - p)`.
pub fn pvalue_to_significance(p: f64) -> f64 {
    normal_quantile(1.0 - p)
}

/// One-sided p-value of a significance: `p = 1 - Φ(Z)`.
pub fn significance_to_pvalue(z: f64) -> f64 {
    0.5 * statrs::function::erf::erfc(z / std::f64::consts::SQRT_2)
}

/// Probability mass of the standard normal between 0 and 1σ (≈ 0.3413).
pub fn one_sigma_half_width() -> f64 {
    normal_cdf(1.0) - 0.5
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn cdf_reference_points() {
        assert_abs_diff_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(normal_cdf(1.0), 0.841_344_746_068_542_9, epsilon = 1e-12);
        assert_abs_diff_eq!(one_sigma_half_width(), 0.341_344_746_068_542_9, epsilon = 1e-12);
    }

    #[test]
    fn quantile_inverts_cdf() {
        for &x in &[-2.5, -1.0, 0.0, 0.3, 1.7, 3.0] {
            assert_abs_diff_eq!(normal_quantile(normal_cdf(x)), x, epsilon = 1e-8);
        }
        assert!(normal_quantile(1.5).is_nan());
        assert_eq!(normal_quantile(1.0), f64::INFINITY);
    }

    #[test]
    fn significance_round_trip() {
        assert_abs_diff_eq!(pvalue_to_significance(0.5), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pvalue_to_significance(2.866_515_7e-7), 5.0, epsilon = 1e-5);
        assert_abs_diff_eq!(significance_to_pvalue(pvalue_to_significance(0.01)), 0.01, epsilon = 1e-10);
    }
}
