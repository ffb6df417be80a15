//! vela execution decision core.
//!
//! `ExecutionCore::place` sizes a trading intent, routes it maker or taker,
//! and stages the resulting child orders; the lifecycle passthroughs then
//! track those children against venue notifications.

pub mod config;
pub mod engine;
pub mod error;

pub use config::AppConfig;
pub use engine::{ExecutionCore, PlaceOutcome};
pub use error::{AppError, AppResult};
