//! Maker/taker routing for the vela decision core.
//!
//! - `FillProbabilityModel`: logistic maker-fill probability
//! - `EdgeBudgetCalculator`: expected values and the integer edge budget
//! - `RouteDecisionEngine`: normalize → quantize → guards → decide → price → finalize

pub mod config;
pub mod edge_budget;
pub mod error;
pub mod fill_prob;
pub mod route_engine;

pub use config::{FillModelConfig, RouterConfig};
pub use edge_budget::{EdgeBudgetCalculator, EdgeEstimate, EdgeInputs};
pub use error::{RouterError, RouterResult};
pub use fill_prob::FillProbabilityModel;
pub use route_engine::RouteDecisionEngine;
