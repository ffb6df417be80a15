//! Lifecycle configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vela_core::Size;

use crate::error::{LifecycleError, LifecycleResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Age after which a resting child escalates to taker.
    #[serde(default = "default_ttl_child_ms")]
    pub ttl_child_ms: u64,
    /// Per-symbol decision cap within the re-quote window.
    #[serde(default = "default_max_requotes_per_min")]
    pub max_requotes_per_min: u32,
    /// Re-quote window length.
    #[serde(default = "default_requote_window_ms")]
    pub requote_window_ms: u64,
    /// Smallest child quantity; also the split and backoff granularity.
    #[serde(default = "default_min_lot")]
    pub min_lot: Size,
    #[serde(default = "default_max_children")]
    pub max_children: u32,
    /// Retries before a rejected child fails permanently.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Retired order ids remembered for late-event tagging.
    #[serde(default = "default_late_id_capacity")]
    pub late_id_capacity: usize,
}

fn default_ttl_child_ms() -> u64 {
    1500
}

fn default_max_requotes_per_min() -> u32 {
    30
}

fn default_requote_window_ms() -> u64 {
    60_000
}

fn default_min_lot() -> Size {
    Size::new(Decimal::new(1, 3))
}

fn default_max_children() -> u32 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_late_id_capacity() -> usize {
    10_000
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl_child_ms: default_ttl_child_ms(),
            max_requotes_per_min: default_max_requotes_per_min(),
            requote_window_ms: default_requote_window_ms(),
            min_lot: default_min_lot(),
            max_children: default_max_children(),
            max_retries: default_max_retries(),
            late_id_capacity: default_late_id_capacity(),
        }
    }
}

impl LifecycleConfig {
    pub fn validate(&self) -> LifecycleResult<()> {
        if !self.min_lot.is_positive() {
            return Err(LifecycleError::ConfigError(format!(
                "min_lot must be positive, got {}",
                self.min_lot
            )));
        }
        if self.max_children == 0 {
            return Err(LifecycleError::ConfigError(
                "max_children must be at least 1".to_string(),
            ));
        }
        if self.ttl_child_ms == 0 || self.requote_window_ms == 0 {
            return Err(LifecycleError::ConfigError(
                "ttl_child_ms and requote_window_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
