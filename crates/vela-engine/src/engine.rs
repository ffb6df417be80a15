//! Top-level execution core.
//!
//! # `place` pipeline (strict order)
//!
//! 1. Re-quote guard → `SIZE_ZERO.DENY` (stage `requote`)
//! 2. Kelly sizing → `SIZE_ZERO.DENY` (stage `sizing`) when nothing survives
//! 3. Route decision with the sized quantity
//! 4. Split a routed plan into `PENDING` child orders on the market lot
//!    grid → `SIZE_ZERO.DENY` (stage `lifecycle`) when no child reaches
//!    `min_lot`
//! 5. `EXEC_DECISION` audit event for every outcome
//!
//! `place` never fails: faults in any stage come back as `INTERNAL_ERROR`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};
use vela_core::{
    emit_guarded, event_codes, ChildOrder, CleanupTrigger, Decision, DecisionFeatures, DenyCode,
    DenyDecision, EventFields, EventSink, Fill, MarketSpec, OrderIntent, RejectReason,
};
use vela_lifecycle::{ChildOrderLifecycleManager, LifecycleError, Transition};
use vela_risk::{KellyApplied, KellySizingEngine, RiskError};
use vela_router::RouteDecisionEngine;
use vela_telemetry::{MeteredSink, Metrics};

use crate::config::AppConfig;
use crate::error::AppResult;

/// Everything one `place` call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOutcome {
    pub decision: Decision,
    /// Present whenever sizing ran, including when it produced zero.
    pub sizing: Option<KellyApplied>,
    /// Children created for a routed plan; empty on deny.
    pub children: Vec<ChildOrder>,
}

impl PlaceOutcome {
    fn denied(deny: DenyDecision, sizing: Option<KellyApplied>) -> Self {
        Self {
            decision: Decision::Denied(deny),
            sizing,
            children: Vec::new(),
        }
    }
}

pub struct ExecutionCore {
    sizing: KellySizingEngine,
    router: RouteDecisionEngine,
    lifecycle: ChildOrderLifecycleManager,
    sink: Arc<dyn EventSink>,
}

impl ExecutionCore {
    /// Build the core. `sink` is wrapped so that its failures are counted
    /// and never reach the decision path.
    pub fn new(config: AppConfig, sink: Arc<dyn EventSink>) -> AppResult<Self> {
        config.validate()?;
        let sink: Arc<dyn EventSink> = Arc::new(MeteredSink::new(sink));
        let AppConfig {
            kelly,
            multipliers,
            tail_risk,
            router,
            fill_model,
            lifecycle,
        } = config;

        info!(
            p_min_fill = router.p_min_fill,
            max_children = lifecycle.max_children,
            ttl_child_ms = lifecycle.ttl_child_ms,
            "execution core initialized"
        );

        Ok(Self {
            sizing: KellySizingEngine::new(kelly, multipliers, tail_risk, sink.clone()),
            router: RouteDecisionEngine::new(router, fill_model),
            lifecycle: ChildOrderLifecycleManager::new(lifecycle, sink.clone())?,
            sink,
        })
    }

    pub fn sizing(&self) -> &KellySizingEngine {
        &self.sizing
    }

    pub fn router(&self) -> &RouteDecisionEngine {
        &self.router
    }

    pub fn lifecycle(&self) -> &ChildOrderLifecycleManager {
        &self.lifecycle
    }

    /// Size, route and stage one trading intent.
    ///
    /// `intent.ts_ms` is the decision clock for the re-quote window and the
    /// children's creation time.
    ///
    /// The router always receives the Kelly-sized quantity here, so its
    /// missing-quantity `INTENT_INVALID` deny is only reachable by calling
    /// [`RouteDecisionEngine::route`] directly with `quantity: None` and no
    /// `quantity_hint`.
    pub fn place(
        &self,
        intent: &OrderIntent,
        market: &MarketSpec,
        features: &DecisionFeatures,
        measured_latency_ms: f64,
    ) -> PlaceOutcome {
        let started = Instant::now();
        let outcome = match catch_unwind(AssertUnwindSafe(|| {
            self.run(intent, market, features, measured_latency_ms)
        })) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(intent_id = %intent.id, "place panicked");
                PlaceOutcome::denied(
                    DenyDecision::new(DenyCode::InternalError, "internal", "panic during place")
                        .with("correlation_id", intent.id.clone()),
                    None,
                )
            }
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record_decision(intent, &outcome, elapsed_ms);
        outcome
    }

    fn run(
        &self,
        intent: &OrderIntent,
        market: &MarketSpec,
        features: &DecisionFeatures,
        measured_latency_ms: f64,
    ) -> PlaceOutcome {
        if !self.lifecycle.try_requote(&intent.symbol, intent.ts_ms) {
            let max = self.lifecycle.config().max_requotes_per_min;
            debug!(intent_id = %intent.id, symbol = %intent.symbol, max, "re-quote throttled");
            let mut fields = EventFields::new();
            fields.insert("correlation_id".into(), json!(intent.id));
            fields.insert("symbol".into(), json!(intent.symbol));
            fields.insert("max_requotes_per_min".into(), json!(max));
            fields.insert("ts_ms".into(), json!(intent.ts_ms));
            emit_guarded(self.sink.as_ref(), event_codes::REQUOTE_THROTTLED, &fields);
            return PlaceOutcome::denied(
                DenyDecision::new(DenyCode::SizeZero, "requote", "re-quote window exhausted")
                    .with("correlation_id", intent.id.clone())
                    .with("max_requotes_per_min", max),
                None,
            );
        }

        let sizing = match self.sizing.size(intent, market, features) {
            Ok(applied) => applied,
            Err(e) => return PlaceOutcome::denied(sizing_deny(intent, &e), None),
        };
        if !sizing.qty_final.is_positive() {
            let deny = DenyDecision::new(DenyCode::SizeZero, "sizing", "sized quantity is zero")
                .with("correlation_id", intent.id.clone())
                .with("raw_fraction", sizing.raw_fraction)
                .with("composite_multiplier", sizing.composite_multiplier)
                .with("cvar_allowed", sizing.cvar_allowed);
            return PlaceOutcome::denied(deny, Some(sizing));
        }

        let decision = self.router.route(
            intent,
            market,
            features,
            Some(sizing.qty_final),
            measured_latency_ms,
        );
        let plan = match decision {
            Decision::Routed(plan) => plan,
            Decision::Denied(deny) => return PlaceOutcome::denied(deny, Some(sizing)),
        };

        match self
            .lifecycle
            .split(&plan, market.tick_size, market.lot_size, intent.ts_ms)
        {
            Ok(children) => PlaceOutcome {
                decision: Decision::Routed(plan),
                sizing: Some(sizing),
                children,
            },
            Err(LifecycleError::BelowMinLot { qty, min }) => {
                debug!(intent_id = %intent.id, %qty, %min, "plan below minimum child size");
                PlaceOutcome::denied(
                    DenyDecision::new(
                        DenyCode::SizeZero,
                        "lifecycle",
                        "quantity below minimum child size",
                    )
                    .with("correlation_id", intent.id.clone())
                    .with("quantity", qty)
                    .with("min_child", min),
                    Some(sizing),
                )
            }
            Err(e) => {
                warn!(intent_id = %intent.id, error = %e, "child split failed");
                PlaceOutcome::denied(
                    DenyDecision::new(DenyCode::InternalError, "lifecycle", e.to_string())
                        .with("correlation_id", intent.id.clone()),
                    Some(sizing),
                )
            }
        }
    }

    fn record_decision(&self, intent: &OrderIntent, outcome: &PlaceOutcome, elapsed_ms: f64) {
        let mut fields = EventFields::new();
        fields.insert("correlation_id".into(), json!(intent.id));
        fields.insert("symbol".into(), json!(intent.symbol));
        fields.insert("side".into(), json!(intent.side.to_string()));
        fields.insert("decision_ms".into(), json!(elapsed_ms));
        if let Some(sizing) = &outcome.sizing {
            fields.insert("qty_final".into(), json!(sizing.qty_final.to_string()));
            fields.insert("composite_multiplier".into(), json!(sizing.composite_multiplier));
        }

        match &outcome.decision {
            Decision::Routed(plan) => {
                let mode = plan.mode.as_str();
                fields.insert("outcome".into(), json!("routed"));
                fields.insert("mode".into(), json!(mode));
                fields.insert("group_id".into(), json!(plan.group_id));
                fields.insert("quantity".into(), json!(plan.quantity.to_string()));
                fields.insert(
                    "price".into(),
                    json!(plan.mode.price().map(|p| p.to_string())),
                );
                fields.insert("p_fill".into(), json!(plan.p_fill));
                fields.insert("children".into(), json!(outcome.children.len()));
                fields.insert("governance_state".into(), json!(plan.governance_state));
                fields.extend(plan.edge.to_diagnostics());

                Metrics::decision_routed(&plan.symbol, mode, plan.edge.net_after_tca as f64);
                Metrics::decision_latency("routed", elapsed_ms);
                debug!(
                    intent_id = %intent.id,
                    symbol = %plan.symbol,
                    mode,
                    net_bps = plan.edge.net_after_tca,
                    "decision routed"
                );
            }
            Decision::Denied(deny) => {
                fields.insert("outcome".into(), json!("denied"));
                fields.insert("code".into(), json!(deny.code.as_str()));
                fields.insert("stage".into(), json!(deny.stage));
                fields.insert("reason".into(), json!(deny.reason));
                fields.insert("diagnostics".into(), json!(deny.diagnostics));

                Metrics::decision_denied(&intent.symbol, deny.code.as_str(), &deny.stage);
                Metrics::decision_latency("denied", elapsed_ms);
                debug!(
                    intent_id = %intent.id,
                    code = %deny.code,
                    stage = %deny.stage,
                    "decision denied"
                );
            }
        }
        emit_guarded(self.sink.as_ref(), event_codes::EXEC_DECISION, &fields);
        Metrics::active_child_orders(self.lifecycle.active_count());
    }

    pub fn on_ack(&self, order_id: &str, ts_ms: u64, latency_ms: f64) -> Transition {
        self.lifecycle.on_ack(order_id, ts_ms, latency_ms)
    }

    pub fn on_fill(&self, order_id: &str, fill: Fill) -> Transition {
        let t = self.lifecycle.on_fill(order_id, fill);
        Metrics::active_child_orders(self.lifecycle.active_count());
        t
    }

    pub fn on_cancel(&self, order_id: &str, ts_ms: u64) -> Transition {
        let t = self.lifecycle.on_cancel(order_id, ts_ms);
        Metrics::active_child_orders(self.lifecycle.active_count());
        t
    }

    pub fn on_reject(&self, order_id: &str, reason: RejectReason, ts_ms: u64) -> Transition {
        let t = self.lifecycle.on_reject(order_id, reason, ts_ms);
        Metrics::active_child_orders(self.lifecycle.active_count());
        t
    }

    /// Reject with the venue's raw reason string.
    pub fn on_reject_raw(&self, order_id: &str, raw_reason: &str, ts_ms: u64) -> Transition {
        self.on_reject(order_id, RejectReason::from_exchange(raw_reason), ts_ms)
    }

    pub fn check_escalations(&self, correlation_id: &str, now_ms: u64) -> Vec<ChildOrder> {
        self.lifecycle.check_escalations(correlation_id, now_ms)
    }

    pub fn sweep_expired(&self, now_ms: u64) -> Vec<ChildOrder> {
        self.lifecycle.sweep_expired(now_ms)
    }

    pub fn cleanup(
        &self,
        correlation_id: &str,
        trigger: CleanupTrigger,
        now_ms: u64,
    ) -> Vec<ChildOrder> {
        self.lifecycle.cleanup(correlation_id, trigger, now_ms)
    }
}

fn sizing_deny(intent: &OrderIntent, e: &RiskError) -> DenyDecision {
    let code = match e {
        RiskError::InvalidInput(_) => DenyCode::IntentInvalid,
        _ => DenyCode::InternalError,
    };
    debug!(intent_id = %intent.id, error = %e, %code, "sizing failed");
    DenyDecision::new(code, "sizing", e.to_string()).with("correlation_id", intent.id.clone())
}
