//! # hp-core
//!
//! Shared error and category types for hepplot.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::ProcessKind;

/// hepplot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
