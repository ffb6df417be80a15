//! Lifecycle error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Quantity {qty} below minimum child size {min}")]
    BelowMinLot { qty: String, min: String },
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
