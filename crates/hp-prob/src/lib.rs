//! # hp-prob
//!
//! Statistics used by hepplot tables and background predictions:
//! - [`GammaParams`]: weighted yields as Gamma-distributed counts
//! - normal p-value/significance conversions
//! - Zbi and toy-based discovery significance
//! - the ratio-of-products ("kappa"/ABCD) estimator with toy errors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gamma;
pub mod kappa;
pub mod normal;
pub mod significance;

pub use gamma::GammaParams;
pub use kappa::{KAPPA_SENTINEL, KappaOptions, KappaResult, KappaTerm, calc_kappa};
pub use normal::{normal_cdf, normal_quantile, pvalue_to_significance, significance_to_pvalue};
pub use significance::{
    INVALID_SIGNIFICANCE, SignificanceOptions, binomial_exp_z, binomial_obs_z, significance,
    significance_with,
};
