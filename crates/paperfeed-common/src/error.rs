//! Error types shared across paperfeed crates

use thiserror::Error;

/// Result type alias for paperfeed operations
pub type Result<T> = std::result::Result<T, PaperfeedError>;

/// Main error type for paperfeed domain values
#[derive(Error, Debug)]
pub enum PaperfeedError {
    #[error("Invalid source locator: {0}")]
    InvalidLocator(String),

    #[error("Invalid version in locator '{locator}': {reason}")]
    InvalidVersion { locator: String, reason: String },

    #[error("Invalid {field} timestamp '{value}', expected YYYY-MM-DDTHH:MM:SSZ")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("Invalid replace policy: {0}")]
    InvalidPolicy(String),
}
