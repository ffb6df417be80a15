//! Audit sinks backed by tracing and prometheus.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{info, warn};
use vela_core::{emit_guarded, EventFields, EventSink};

use crate::logging::AUDIT_TARGET;
use crate::metrics::Metrics;

/// Writes every audit event as a structured `tracing` record at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, code: &str, fields: &EventFields) {
        let correlation_id = fields
            .get("correlation_id")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let payload = serde_json::to_string(fields).unwrap_or_default();
        info!(target: AUDIT_TARGET, code, correlation_id, fields = %payload, "audit event");
    }
}

/// Delivers every event to each sink in order. A failing sink does not
/// stop delivery to the rest.
pub struct TeeSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for TeeSink {
    fn emit(&self, code: &str, fields: &EventFields) {
        for sink in &self.sinks {
            emit_guarded(sink.as_ref(), code, fields);
        }
    }
}

/// Wraps a sink, counting deliveries and swallowing failures.
///
/// A panicking inner sink is counted in `vela_sink_failures_total` and
/// never reaches the caller.
pub struct MeteredSink {
    inner: Arc<dyn EventSink>,
}

impl MeteredSink {
    pub fn new(inner: Arc<dyn EventSink>) -> Self {
        Self { inner }
    }
}

impl EventSink for MeteredSink {
    fn emit(&self, code: &str, fields: &EventFields) {
        match catch_unwind(AssertUnwindSafe(|| self.inner.emit(code, fields))) {
            Ok(()) => Metrics::event_delivered(code),
            Err(_) => {
                Metrics::sink_failure(code);
                warn!(code, "audit sink panicked, event dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{EVENTS_TOTAL, SINK_FAILURES_TOTAL};
    use serde_json::json;
    use vela_core::RecordingSink;

    struct PanickingSink;

    impl EventSink for PanickingSink {
        fn emit(&self, _code: &str, _fields: &EventFields) {
            panic!("sink down");
        }
    }

    fn fields() -> EventFields {
        let mut f = EventFields::new();
        f.insert("correlation_id".into(), json!("intent-1"));
        f
    }

    #[test]
    fn test_metered_sink_forwards() {
        let inner = Arc::new(RecordingSink::new());
        let sink = MeteredSink::new(inner.clone());
        let before = EVENTS_TOTAL.with_label_values(&["METERED_OK"]).get();
        sink.emit("METERED_OK", &fields());
        assert_eq!(inner.count("METERED_OK"), 1);
        assert_eq!(EVENTS_TOTAL.with_label_values(&["METERED_OK"]).get(), before + 1);
    }

    #[test]
    fn test_metered_sink_swallows_panic() {
        let sink = MeteredSink::new(Arc::new(PanickingSink));
        let before = SINK_FAILURES_TOTAL.with_label_values(&["METERED_FAIL"]).get();
        sink.emit("METERED_FAIL", &fields());
        assert_eq!(
            SINK_FAILURES_TOTAL.with_label_values(&["METERED_FAIL"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_tee_sink_reaches_every_sink() {
        let first = Arc::new(RecordingSink::new());
        let second = Arc::new(RecordingSink::new());
        let tee = TeeSink::new(vec![
            first.clone() as Arc<dyn EventSink>,
            Arc::new(PanickingSink),
            Arc::new(TracingEventSink),
            second.clone(),
        ]);
        tee.emit("TEE", &fields());
        assert_eq!(first.count("TEE"), 1);
        assert_eq!(second.count("TEE"), 1);
    }

    #[test]
    fn test_tracing_sink_does_not_panic_without_subscriber() {
        TracingEventSink.emit("EXEC_DECISION", &fields());
    }
}
