//! Position sizing for the vela decision core.
//!
//! - `RiskMultiplierOrchestrator`: bounded multipliers from calibration,
//!   regime, liquidity, drawdown and latency signals
//! - `PortfolioShrinkage`: covariance shrinkage and portfolio-adjusted fraction
//! - `TailRiskGate`: GPD tail fit, CVaR and the CVaR admission check
//! - `KellySizingEngine`: composes the above into a lot-quantized quantity

pub mod config;
pub mod error;
pub mod kelly;
pub mod multipliers;
pub mod shrinkage;
pub mod tail;

pub use config::{KellyBounds, KellyConfig, MultiplierConfig, TailRiskConfig};
pub use error::{RiskError, RiskResult};
pub use kelly::{KellyApplied, KellySizingEngine};
pub use multipliers::{Multipliers, RiskMultiplierOrchestrator};
pub use shrinkage::PortfolioShrinkage;
pub use tail::{GpdFit, TailRiskGate};
