//! Router error types.
//!
//! These never reach callers of `route`; they are converted into an
//! `INTERNAL_ERROR` deny.

use thiserror::Error;
use vela_core::CoreError;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type RouterResult<T> = Result<T, RouterError>;
