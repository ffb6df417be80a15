//! Per-symbol re-quote throttle.
//!
//! A sliding window of decision timestamps per symbol. Lives inside the
//! lifecycle manager's table and is only touched under its lock.

use std::collections::HashMap;

use tracing::debug;

#[derive(Debug, Default)]
pub struct RequoteGuard {
    window_ms: u64,
    max_per_window: u32,
    stamps: HashMap<String, Vec<u64>>,
}

impl RequoteGuard {
    pub fn new(window_ms: u64, max_per_window: u32) -> Self {
        Self {
            window_ms,
            max_per_window,
            stamps: HashMap::new(),
        }
    }

    /// Record a decision for `symbol` at `now_ms` if the window has room.
    ///
    /// Returns `false` once the window is exhausted; nothing is recorded then.
    pub fn try_acquire(&mut self, symbol: &str, now_ms: u64) -> bool {
        let window_ms = self.window_ms;
        let stamps = self.stamps.entry(symbol.to_string()).or_default();
        stamps.retain(|&t| now_ms.saturating_sub(t) < window_ms);

        if stamps.len() >= self.max_per_window as usize {
            debug!(
                symbol,
                count = stamps.len(),
                max = self.max_per_window,
                "re-quote window exhausted"
            );
            return false;
        }
        stamps.push(now_ms);
        true
    }

    /// Decisions recorded for `symbol` inside the window ending at `now_ms`.
    pub fn count(&self, symbol: &str, now_ms: u64) -> usize {
        self.stamps.get(symbol).map_or(0, |s| {
            s.iter()
                .filter(|&&t| now_ms.saturating_sub(t) < self.window_ms)
                .count()
        })
    }
}
