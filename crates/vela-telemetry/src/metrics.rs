//! Prometheus metrics for the decision core.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means a duplicate metric
//! name, which is a build-time mistake; it surfaces on first use of the
//! static, never on the decision path after that.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Decisions by outcome.
/// Labels: symbol, outcome (maker/taker/denied)
pub static DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vela_decisions_total",
        "Total placement decisions",
        &["symbol", "outcome"]
    )
    .unwrap()
});

/// Denials by code and stage.
pub static DENIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "vela_denies_total",
        "Total denied decisions",
        &["code", "stage"]
    )
    .unwrap()
});

/// Audit events delivered, by code.
pub static EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "vela_events_total",
        "Audit events delivered to the sink",
        &["code"]
    )
    .unwrap()
});

/// Sink failures swallowed, by code.
pub static SINK_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "vela_sink_failures_total",
        "Audit events dropped because the sink failed",
        &["code"]
    )
    .unwrap()
});

/// End-to-end `place` latency in milliseconds.
pub static DECISION_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "vela_decision_latency_ms",
        "Placement decision latency in milliseconds",
        &["outcome"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 8.0, 20.0]
    )
    .unwrap()
});

/// Net edge after TCA of routed plans.
pub static EDGE_NET_BPS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "vela_edge_net_bps",
        "Net edge after TCA of routed plans in basis points",
        &["mode"],
        vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0]
    )
    .unwrap()
});

/// Active child orders held by the lifecycle manager.
pub static ACTIVE_CHILD_ORDERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "vela_active_child_orders",
        "Child orders in a non-terminal state"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a routed decision.
    pub fn decision_routed(symbol: &str, mode: &str, net_bps: f64) {
        DECISIONS_TOTAL.with_label_values(&[symbol, mode]).inc();
        EDGE_NET_BPS.with_label_values(&[mode]).observe(net_bps);
    }

    /// Record a denied decision.
    pub fn decision_denied(symbol: &str, code: &str, stage: &str) {
        DECISIONS_TOTAL.with_label_values(&[symbol, "denied"]).inc();
        DENIES_TOTAL.with_label_values(&[code, stage]).inc();
    }

    pub fn decision_latency(outcome: &str, latency_ms: f64) {
        DECISION_LATENCY_MS
            .with_label_values(&[outcome])
            .observe(latency_ms);
    }

    pub fn event_delivered(code: &str) {
        EVENTS_TOTAL.with_label_values(&[code]).inc();
    }

    pub fn sink_failure(code: &str) {
        SINK_FAILURES_TOTAL.with_label_values(&[code]).inc();
    }

    pub fn active_child_orders(count: usize) {
        ACTIVE_CHILD_ORDERS.set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render the default registry in the text exposition format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
