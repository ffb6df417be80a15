//! Child-order lifecycle for the vela execution core.
//!
//! Tracks the children of each routed plan from creation to a terminal
//! state, applies reason-specific reject backoff, and throttles per-symbol
//! re-quoting.

pub mod backoff;
pub mod config;
pub mod error;
pub mod manager;
pub mod requote;

pub use backoff::Backoff;
pub use config::LifecycleConfig;
pub use error::{LifecycleError, LifecycleResult};
pub use manager::{ChildOrderLifecycleManager, Transition};
pub use requote::RequoteGuard;
