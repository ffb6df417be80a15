//! Audit event sink.
//!
//! Every decision, sizing adjustment and lifecycle transition is reported
//! through an injected [`EventSink`]. Sink failures never alter decisions:
//! callers go through [`emit_guarded`], which swallows panics and reports
//! whether delivery succeeded.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Structured event payload. Ordered so serialized events are stable.
pub type EventFields = BTreeMap<String, Value>;

/// Event codes emitted by the decision core.
pub mod event_codes {
    pub const EXEC_DECISION: &str = "EXEC_DECISION";
    pub const ORDER_ACK: &str = "ORDER_ACK";
    pub const FILL_EVENT: &str = "FILL_EVENT";
    pub const ORDER_ESCALATE: &str = "ORDER_ESCALATE";
    pub const ORDER_REJECT: &str = "ORDER_REJECT";
    pub const CLEANUP: &str = "CLEANUP";
    pub const KELLY_APPLIED: &str = "KELLY.APPLIED";
    pub const CVAR_SHIFT: &str = "CVAR.SHIFT";
    pub const REQUOTE_THROTTLED: &str = "REQUOTE.THROTTLED";
}

/// Injected collaborator receiving audit events.
///
/// Implementations must be cheap; they are called on the decision path.
pub trait EventSink: Send + Sync {
    fn emit(&self, code: &str, fields: &EventFields);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _code: &str, _fields: &EventFields) {}
}

/// One captured event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub code: String,
    pub fields: EventFields,
}

/// In-memory sink used by the replay tool and tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events in emission order.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn codes(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.code.clone()).collect()
    }

    /// Number of events with `code`.
    pub fn count(&self, code: &str) -> usize {
        self.events.lock().iter().filter(|e| e.code == code).count()
    }

    /// Last event with `code`, if any.
    pub fn last(&self, code: &str) -> Option<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .rev()
            .find(|e| e.code == code)
            .cloned()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, code: &str, fields: &EventFields) {
        self.events.lock().push(RecordedEvent {
            code: code.to_string(),
            fields: fields.clone(),
        });
    }
}

/// Emit through `sink`, containing any panic raised by the sink.
///
/// Returns `false` when the sink panicked.
pub fn emit_guarded(sink: &dyn EventSink, code: &str, fields: &EventFields) -> bool {
    match catch_unwind(AssertUnwindSafe(|| sink.emit(code, fields))) {
        Ok(()) => true,
        Err(_) => {
            warn!(code, "event sink failed, event dropped");
            false
        }
    }
}
