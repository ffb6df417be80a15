//! Risk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("Invalid sizing input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),
}

pub type RiskResult<T> = Result<T, RiskError>;
