//! Core domain types for the vela execution decision core.
//!
//! This crate provides the vocabulary shared by sizing, routing and
//! child-order lifecycle management:
//! - `Price`, `Size`: precision-safe decimal newtypes
//! - `MarketSpec`: per-decision market snapshot (tick, lot, fees, top of book)
//! - `OrderIntent`, `DecisionFeatures`: immutable decision inputs
//! - `EdgeBudget`, `RoutedOrderPlan`, `DenyDecision`: decision outputs
//! - `ChildOrder`, `OrderState`, `RejectReason`: execution tracking
//! - `EventSink`: injected audit-event collaborator

pub mod decimal;
pub mod decision;
pub mod error;
pub mod events;
pub mod execution;
pub mod intent;
pub mod market;
pub mod order;

pub use decimal::{f64_to_decimal, Price, Size, BPS_DIVISOR};
pub use decision::{
    Bps, Decision, DenyCode, DenyDecision, Diagnostics, EdgeBudget, RouteMode, RoutedOrderPlan,
};
pub use error::{CoreError, Result};
pub use events::{
    emit_guarded, event_codes, EventFields, EventSink, NullSink, RecordedEvent, RecordingSink,
};
pub use execution::{ChildOrder, CleanupTrigger, Fill, OrderMode, OrderState, RejectReason};
pub use intent::{DecisionFeatures, ExecPrefs, OrderIntent, PortfolioContext, Regime, RiskContext};
pub use market::MarketSpec;
pub use order::{group_id, OrderSide, OrderType, TimeInForce};
