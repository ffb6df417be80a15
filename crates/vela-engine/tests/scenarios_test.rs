//! End-to-end decision scenarios.
//!
//! Drives `ExecutionCore::place` and the lifecycle passthroughs against
//! fixed markets:
//! - maker/taker selection by fill probability
//! - CVaR admission
//! - edge identity, sign gates and quantization over a grid of inputs
//! - idempotent lifecycle notifications

mod integration;
use integration::common::{core, core_with, features, intent, market, PanickingSink};

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use vela_core::{event_codes, DenyCode, Fill, OrderSide, OrderState, Price, RouteMode, Size};
use vela_engine::{AppConfig, ExecutionCore};
use vela_lifecycle::Transition;

#[test]
fn test_high_pfill_post_only_routes_maker() {
    let (core, sink) = core();
    let out = core.place(
        &intent("s-1", "ETHUSDT", OrderSide::Buy, 1_000),
        &market("ETHUSDT", dec!(1.5)),
        &features(0.8),
        2.0,
    );
    let plan = out.decision.plan().expect("routed");
    assert!(plan.mode.is_maker());
    assert!(plan.edge.net_after_tca > 0);
    assert_eq!(out.children.len(), 1);

    let ev = sink.last(event_codes::EXEC_DECISION).unwrap();
    assert_eq!(ev.fields["mode"], json!("maker"));
}

#[test]
fn test_low_pfill_routes_taker() {
    let (core, _) = core();
    let out = core.place(
        &intent("s-2", "ETHUSDT", OrderSide::Buy, 1_000),
        &market("ETHUSDT", dec!(1.5)),
        &features(0.4),
        2.0,
    );
    let plan = out.decision.plan().expect("routed");
    assert_eq!(plan.mode, RouteMode::Taker);
    assert!(plan.edge.net_after_tca > 0);
}

#[test]
fn test_low_pfill_without_taker_edge_denies() {
    let (core, _) = core();
    let mut i = intent("s-3", "ETHUSDT", OrderSide::Buy, 1_000);
    i.expected_return_bps = dec!(5);
    i.prefs.post_only = false;
    let out = core.place(&i, &market("ETHUSDT", dec!(1.5)), &features(0.4), 2.0);
    assert_eq!(out.decision.deny_code(), Some(DenyCode::LowPfill));
    assert!(out.children.is_empty());
}

#[test]
fn test_cvar_breach_zeroes_quantity() {
    let mut config = AppConfig::default();
    config.tail_risk.cvar_limit_usd = Some(55.0);
    let (core, sink) = core_with(config);
    let mut i = intent("s-4", "ETHUSDT", OrderSide::Buy, 1_000);
    i.risk.cvar_current_usd = Some(60.0);

    let out = core.place(&i, &market("ETHUSDT", dec!(1.5)), &features(0.8), 2.0);
    let sizing = out.sizing.expect("sizing ran");
    assert!(sizing.qty_final.is_zero());
    assert!(!sizing.cvar_allowed);
    assert_eq!(out.decision.deny_code(), Some(DenyCode::SizeZero));
    assert_eq!(sink.count(event_codes::CVAR_SHIFT), 1);
}

#[test]
fn test_edge_identity_sign_gates_and_quantization_grid() {
    let (core, _) = core_with(AppConfig {
        lifecycle: vela_lifecycle::LifecycleConfig {
            max_requotes_per_min: 10_000,
            ..Default::default()
        },
        ..Default::default()
    });
    let spreads = [dec!(0.5), dec!(1.5), dec!(2.5), dec!(10)];
    let returns = [dec!(8), dec!(20), dec!(60), dec!(150)];
    let p_fills = [0.3, 0.6, 0.9];
    let mut routed = 0;
    let mut n = 0u64;

    for side in [OrderSide::Buy, OrderSide::Sell] {
        for spread in spreads {
            for ret in returns {
                for p in p_fills {
                    n += 1;
                    let m = market("ETHUSDT", spread);
                    let mut i = intent(&format!("g-{n}"), "ETHUSDT", side, n);
                    i.expected_return_bps = ret;
                    let out = core.place(&i, &m, &features(p), 2.0);
                    let Some(plan) = out.decision.plan() else {
                        continue;
                    };
                    routed += 1;

                    let e = &plan.edge;
                    assert!(e.identity_holds());
                    assert_eq!(
                        e.net_after_tca,
                        e.raw + e.fees + e.slip_est + e.adv_sel + e.lat_cost + e.rebates
                    );
                    assert!(e.sign_gates_hold());
                    assert!(e.net_after_tca > 0);

                    assert!(plan.quantity.is_multiple_of(m.lot_size));
                    assert!(plan.quantity.notional(m.mid) >= m.min_notional);

                    if let RouteMode::Maker { price } = plan.mode {
                        match side {
                            OrderSide::Buy => assert!(price <= m.best_bid),
                            OrderSide::Sell => assert!(price >= m.best_ask),
                        }
                        assert!(price.is_on_tick(m.tick_size));
                    }
                }
            }
        }
    }
    assert!(routed > 0);
}

#[test]
fn test_maker_survives_higher_capture_eta() {
    let place_with = |eta: Decimal| {
        let mut config = AppConfig::default();
        config.router.capture_eta = eta;
        let (core, _) = core_with(config);
        let mut i = intent("s-5", "ETHUSDT", OrderSide::Buy, 1_000);
        i.prefs.post_only = false;
        core.place(&i, &market("ETHUSDT", dec!(2)), &features(0.95), 2.0)
    };
    let half = place_with(dec!(0.5));
    let full = place_with(dec!(1.0));
    let half_plan = half.decision.plan().expect("routed at eta 0.5");
    let full_plan = full.decision.plan().expect("routed at eta 1.0");
    assert!(full_plan.e_maker_bps >= half_plan.e_maker_bps);
    if half_plan.mode.is_maker() {
        assert!(full_plan.mode.is_maker());
    }
}

#[test]
fn test_duplicate_notifications_do_not_change_state() {
    let (core, sink) = core();
    let out = core.place(
        &intent("s-6", "ETHUSDT", OrderSide::Buy, 1_000),
        &market("ETHUSDT", dec!(1.5)),
        &features(0.8),
        2.0,
    );
    let child = out.children[0].clone();

    assert!(core.on_ack(&child.id, 1_010, 1.2).is_applied());
    let after_ack = core.lifecycle().order(&child.id);
    assert_eq!(core.on_ack(&child.id, 1_010, 1.2), Transition::Ignored);
    assert_eq!(core.lifecycle().order(&child.id), after_ack);

    let fill = Fill {
        trade_id: Some("trade-1".to_string()),
        ts_ms: 1_020,
        qty: child.target_qty * dec!(0.5),
        price: Price::new(dec!(99.99)),
    };
    assert!(core.on_fill(&child.id, fill.clone()).is_applied());
    let after_fill = core.lifecycle().order(&child.id);
    assert_eq!(core.on_fill(&child.id, fill), Transition::Duplicate);
    assert_eq!(core.lifecycle().order(&child.id), after_fill);
    assert_eq!(
        after_fill.map(|o| o.state),
        Some(OrderState::Partial)
    );
    assert_eq!(sink.count(event_codes::ORDER_ACK), 1);
    assert_eq!(sink.count(event_codes::FILL_EVENT), 1);
}

#[test]
fn test_cleanup_then_late_fill() {
    let (core, sink) = core();
    let out = core.place(
        &intent("s-7", "ETHUSDT", OrderSide::Sell, 1_000),
        &market("ETHUSDT", dec!(1.5)),
        &features(0.8),
        2.0,
    );
    let child = out.children[0].clone();
    core.on_ack(&child.id, 1_001, 1.0);

    let cleaned = core.cleanup("s-7", vela_core::CleanupTrigger::StopLoss, 1_100);
    assert_eq!(cleaned.len(), 1);
    assert!(core.on_cancel(&child.id, 1_200).is_applied());

    let late = core.on_fill(
        &child.id,
        Fill {
            trade_id: Some("late-1".into()),
            ts_ms: 1_300,
            qty: child.target_qty,
            price: Price::new(dec!(100.01)),
        },
    );
    assert_eq!(late, Transition::Late);
    let ev = sink.last(event_codes::FILL_EVENT).unwrap();
    assert_eq!(ev.fields["late"], json!(true));
    assert_eq!(ev.fields["correlation_id"], json!("s-7"));
}

#[test]
fn test_failing_sink_never_changes_decision() {
    let core = ExecutionCore::new(AppConfig::default(), Arc::new(PanickingSink)).unwrap();
    let before = vela_telemetry::metrics::SINK_FAILURES_TOTAL
        .with_label_values(&[event_codes::EXEC_DECISION])
        .get();

    let out = core.place(
        &intent("s-8", "ETHUSDT", OrderSide::Buy, 1_000),
        &market("ETHUSDT", dec!(1.5)),
        &features(0.8),
        2.0,
    );
    assert!(out.decision.plan().expect("routed").mode.is_maker());
    assert_eq!(out.children.len(), 1);
    assert!(
        vela_telemetry::metrics::SINK_FAILURES_TOTAL
            .with_label_values(&[event_codes::EXEC_DECISION])
            .get()
            > before
    );
}

#[test]
fn test_spread_too_wide_denied() {
    let (core, _) = core();
    let out = core.place(
        &intent("s-9", "ETHUSDT", OrderSide::Buy, 1_000),
        &market("ETHUSDT", dec!(30)),
        &features(0.8),
        2.0,
    );
    assert_eq!(out.decision.deny_code(), Some(DenyCode::SpreadDeny));
    assert!(out.sizing.is_some());
}

#[test]
fn test_children_land_on_market_lot_grid() {
    let mut config = AppConfig::default();
    config.lifecycle.max_children = 3;
    let (core, _) = core_with(config);
    let m = market("ETHUSDT", dec!(1.5));
    let out = core.place(
        &intent("s-10", "ETHUSDT", OrderSide::Buy, 1_000),
        &m,
        &features(0.8),
        2.0,
    );
    let plan = out.decision.plan().expect("routed");
    assert_eq!(out.children.len(), 3);
    assert!(out
        .children
        .iter()
        .all(|c| c.target_qty.is_multiple_of(m.lot_size)));
    let total = out
        .children
        .iter()
        .fold(Size::ZERO, |acc, c| acc + c.target_qty);
    assert_eq!(total, plan.quantity);
}

#[test]
fn test_plan_below_min_lot_denied_without_children() {
    let mut config = AppConfig::default();
    config.lifecycle.min_lot = Size::new(dec!(1));
    let (core, sink) = core_with(config);
    let mut i = intent("s-11", "ETHUSDT", OrderSide::Buy, 1_000);
    i.risk.equity_usd = dec!(50);

    let out = core.place(&i, &market("ETHUSDT", dec!(1.5)), &features(0.8), 2.0);
    let deny = out.decision.deny().expect("denied");
    assert_eq!(deny.code, DenyCode::SizeZero);
    assert_eq!(deny.stage, "lifecycle");
    assert!(out.children.is_empty());
    assert_eq!(core.lifecycle().active_count(), 0);

    let ev = sink.last(event_codes::EXEC_DECISION).unwrap();
    assert_eq!(ev.fields["stage"], json!("lifecycle"));
}
