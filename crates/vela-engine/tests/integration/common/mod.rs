//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vela_core::{
    DecisionFeatures, EventFields, EventSink, ExecPrefs, MarketSpec, OrderIntent, OrderSide,
    Price, RecordingSink, RiskContext, Size, TimeInForce,
};
use vela_engine::{AppConfig, ExecutionCore};

/// Mid 100 market with the given spread, tick 0.0001, lot 0.01,
/// min notional 5, maker 1 bps, taker 5 bps.
pub fn market(symbol: &str, spread_bps: Decimal) -> MarketSpec {
    let half = dec!(100) * spread_bps / dec!(20000);
    MarketSpec::from_quotes(
        symbol,
        Price::new(dec!(0.0001)),
        Size::new(dec!(0.01)),
        dec!(5),
        dec!(1),
        dec!(5),
        Price::new(dec!(100) - half),
        Price::new(dec!(100) + half),
    )
}

pub fn intent(id: &str, symbol: &str, side: OrderSide, ts_ms: u64) -> OrderIntent {
    OrderIntent {
        id: id.to_string(),
        ts_ms,
        symbol: symbol.to_string(),
        side,
        expected_return_bps: dec!(60),
        stop_distance_bps: dec!(50),
        take_profit_bps: vec![dec!(120)],
        risk: RiskContext {
            equity_usd: dec!(10000),
            cvar_current_usd: None,
            loss_history_usd: Vec::new(),
            portfolio: None,
        },
        prefs: ExecPrefs {
            post_only: true,
            tif: TimeInForce::Gtc,
        },
        quantity_hint: None,
    }
}

pub fn features(p_fill: f64) -> DecisionFeatures {
    DecisionFeatures {
        p_fill: Some(p_fill),
        predicted_latency_ms: Some(2.0),
        ..Default::default()
    }
}

pub fn core_with(config: AppConfig) -> (ExecutionCore, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let core = ExecutionCore::new(config, sink.clone()).expect("valid config");
    (core, sink)
}

pub fn core() -> (ExecutionCore, Arc<RecordingSink>) {
    core_with(AppConfig::default())
}

/// Sink that always panics.
pub struct PanickingSink;

impl EventSink for PanickingSink {
    fn emit(&self, code: &str, _fields: &EventFields) {
        panic!("sink unavailable for {code}");
    }
}
