//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Risk error: {0}")]
    Risk(#[from] vela_risk::RiskError),

    #[error("Router error: {0}")]
    Router(#[from] vela_router::RouterError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] vela_lifecycle::LifecycleError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] vela_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
