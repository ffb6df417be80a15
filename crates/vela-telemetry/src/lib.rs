//! Observability for the vela execution core.
//!
//! - Structured logging via `tracing` (JSON in production)
//! - Prometheus counters and histograms for decisions and audit delivery
//! - Audit sinks that log events and count sink failures

pub mod error;
pub mod logging;
pub mod metrics;
pub mod sink;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, AUDIT_TARGET};
pub use metrics::Metrics;
pub use sink::{MeteredSink, TeeSink, TracingEventSink};
