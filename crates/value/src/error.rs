//! Value construction errors.

use thiserror::Error;

/// Errors raised while building values from external data.
#[derive(Debug, Error)]
pub enum ValueError {
    /// A JSON number could not be represented exactly as a decimal.
    #[error("number {0} cannot be represented as a decimal")]
    InvalidNumber(String),

    /// A money amount was paired with an empty currency code.
    #[error("money amount {amount} has an empty currency code")]
    EmptyCurrency {
        /// The rejected amount, rendered.
        amount: String,
    },
}

impl ValueError {
    /// Get error code for categorization
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidNumber(_) => "VALUE:NUMBER",
            Self::EmptyCurrency { .. } => "VALUE:CURRENCY",
        }
    }
}

/// Result type for value operations
pub type ValueResult<T> = Result<T, ValueError>;
