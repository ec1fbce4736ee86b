//! Error types for hepplot

use thiserror::Error;

/// hepplot error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error (inconsistent shapes, bad arguments)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error in an analysis definition (unknown option,
    /// unregistered process, missing ratio denominator, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Expression parse or evaluation error
    #[error("Expression error: {0}")]
    Expression(String),

    /// An event source could not be opened or read
    #[error("Data availability error: {0}")]
    DataAvailability(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

impl Error {
    /// Prefix the message with context (figure/process names) while keeping the variant.
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            Error::Validation(m) => Error::Validation(format!("{ctx}: {m}")),
            Error::Config(m) => Error::Config(format!("{ctx}: {m}")),
            Error::Expression(m) => Error::Expression(format!("{ctx}: {m}")),
            Error::DataAvailability(m) => Error::DataAvailability(format!("{ctx}: {m}")),
            Error::Computation(m) => Error::Computation(format!("{ctx}: {m}")),
            other => other,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
