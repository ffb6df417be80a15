//! Error types for vela-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid market spec: {0}")]
    InvalidMarket(String),

    #[error("Invalid feature: {0}")]
    InvalidFeature(String),

    #[error("Non-finite value for {0}")]
    NonFinite(&'static str),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
