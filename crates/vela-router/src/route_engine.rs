//! Route decision engine.
//!
//! # Pipeline (strict order)
//!
//! 1. normalize → `INTENT_INVALID`
//! 2. quantize  → `LOT_SIZE`, `MIN_NOTIONAL`
//! 3. guards    → `SPREAD_DENY`, `SLA_PREDICT`, `SLA_LATENCY`, `EDGE_FLOOR`
//! 4. decide    → `POST_ONLY_UNAVAILABLE`, `LOW_PFILL.DENY`, `EDGE_DENY`
//! 5. price     → `POST_ONLY_BREACH`, `PERCENT_PRICE` (maker only)
//! 6. finalize  → `EDGE_DENY` when `net_after_tca <= 0`
//!
//! Internal faults and panics become `INTERNAL_ERROR`; `route` never
//! propagates a failure to its caller.

use std::panic::{catch_unwind, AssertUnwindSafe};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, error, trace, warn};
use vela_core::{
    f64_to_decimal, group_id, Decision, DecisionFeatures, DenyCode, DenyDecision, Diagnostics,
    EdgeBudget, MarketSpec, OrderIntent, OrderSide, OrderType, Price, RouteMode, RoutedOrderPlan,
    Size, TimeInForce, BPS_DIVISOR,
};

use crate::config::{FillModelConfig, RouterConfig};
use crate::edge_budget::{EdgeBudgetCalculator, EdgeEstimate, EdgeInputs};
use crate::error::RouterError;
use crate::fill_prob::FillProbabilityModel;

/// Why the pipeline stopped early.
enum Halt {
    Deny(DenyDecision),
    Fault(RouterError),
}

impl From<RouterError> for Halt {
    fn from(e: RouterError) -> Self {
        Self::Fault(e)
    }
}

impl From<DenyDecision> for Halt {
    fn from(d: DenyDecision) -> Self {
        Self::Deny(d)
    }
}

type Stage<T> = Result<T, Halt>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Maker,
    Taker,
}

struct Quantized {
    qty: Size,
    notional: Decimal,
}

struct Decided {
    selection: Selection,
    p_fill: f64,
    inputs: EdgeInputs,
    estimate: EdgeEstimate,
}

pub struct RouteDecisionEngine {
    config: RouterConfig,
    fill_model: FillProbabilityModel,
    edge: EdgeBudgetCalculator,
}

impl RouteDecisionEngine {
    pub fn new(config: RouterConfig, fill_model: FillModelConfig) -> Self {
        let edge = EdgeBudgetCalculator::from_config(&config);
        Self {
            config,
            fill_model: FillProbabilityModel::new(fill_model),
            edge,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn fill_model(&self) -> &FillProbabilityModel {
        &self.fill_model
    }

    /// Route `intent` against `market`.
    ///
    /// `quantity` overrides the intent's quantity hint (the sized quantity
    /// when called after Kelly sizing). Predicted latency falls back to
    /// `measured_latency_ms` when the features carry none.
    pub fn route(
        &self,
        intent: &OrderIntent,
        market: &MarketSpec,
        features: &DecisionFeatures,
        quantity: Option<Size>,
        measured_latency_ms: f64,
    ) -> Decision {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.run(intent, market, features, quantity, measured_latency_ms)
        }));
        match outcome {
            Ok(Ok(plan)) => Decision::Routed(plan),
            Ok(Err(Halt::Deny(deny))) => {
                debug!(
                    intent_id = %intent.id,
                    symbol = %intent.symbol,
                    code = %deny.code,
                    stage = %deny.stage,
                    "route denied"
                );
                Decision::Denied(deny)
            }
            Ok(Err(Halt::Fault(e))) => {
                warn!(intent_id = %intent.id, error = %e, "route internal error");
                Decision::Denied(
                    DenyDecision::new(DenyCode::InternalError, "internal", e.to_string())
                        .with("correlation_id", intent.id.clone()),
                )
            }
            Err(_) => {
                error!(intent_id = %intent.id, "route panicked");
                Decision::Denied(
                    DenyDecision::new(DenyCode::InternalError, "internal", "panic during routing")
                        .with("correlation_id", intent.id.clone()),
                )
            }
        }
    }

    fn run(
        &self,
        intent: &OrderIntent,
        market: &MarketSpec,
        features: &DecisionFeatures,
        quantity: Option<Size>,
        measured_latency_ms: f64,
    ) -> Stage<RoutedOrderPlan> {
        let requested = self.normalize(intent, market, features, quantity)?;
        trace!(intent_id = %intent.id, qty = %requested, "normalized");

        let quantized = self.quantize(market, requested)?;
        let latency_ms = self.guards(intent, market, features, measured_latency_ms)?;
        let decided = self.decide(intent, market, features, latency_ms)?;

        let mode = match decided.selection {
            Selection::Maker => RouteMode::Maker {
                price: self.price(intent.side, market)?,
            },
            Selection::Taker => RouteMode::Taker,
        };
        self.finalize(intent, quantized, mode, decided)
    }

    fn normalize(
        &self,
        intent: &OrderIntent,
        market: &MarketSpec,
        features: &DecisionFeatures,
        quantity: Option<Size>,
    ) -> Stage<Size> {
        const STAGE: &str = "normalize";
        let invalid = |reason: String| DenyDecision::new(DenyCode::IntentInvalid, STAGE, reason);

        if let Err(e) = market.validate() {
            return Err(invalid(format!("invalid market snapshot: {e}")).into());
        }
        if intent.id.is_empty() {
            return Err(invalid("empty intent id".to_string()).into());
        }
        if intent.symbol != market.symbol {
            return Err(invalid(format!(
                "intent symbol {} does not match market {}",
                intent.symbol, market.symbol
            ))
            .into());
        }
        let Some(qty) = quantity.or(intent.quantity_hint) else {
            return Err(invalid("missing quantity hint".to_string()).into());
        };
        if qty < Size::ZERO {
            return Err(invalid(format!("negative quantity {qty}"))
                .with("qty", qty.to_string())
                .into());
        }

        let numeric = [
            ("queue_position", features.queue_position),
            ("depth_at_price", features.depth_at_price),
            ("obi", features.obi),
            ("horizon_ms", features.horizon_ms),
            ("slippage_bps", features.slippage_bps),
            ("adverse_selection_bps", features.adverse_selection_bps),
        ];
        if let Some((name, _)) = numeric.iter().find(|(_, v)| !v.is_finite()) {
            return Err(invalid(format!("non-finite feature {name}")).into());
        }
        if let Some(p) = features.p_fill {
            if !(0.0..=1.0).contains(&p) {
                return Err(invalid(format!("p_fill override {p} outside [0, 1]")).into());
            }
        }
        Ok(qty)
    }

    fn quantize(&self, market: &MarketSpec, requested: Size) -> Stage<Quantized> {
        const STAGE: &str = "quantize";
        let qty = requested.floor_to_lot(market.lot_size);
        if qty.is_zero() {
            return Err(DenyDecision::new(
                DenyCode::LotSize,
                STAGE,
                format!("quantity {requested} floors to zero at lot {}", market.lot_size),
            )
            .with("qty_requested", requested.to_string())
            .with("lot_size", market.lot_size.to_string())
            .into());
        }
        let notional = qty
            .inner()
            .checked_mul(market.mid.inner())
            .ok_or(RouterError::Overflow("notional"))?;
        if notional < market.min_notional {
            return Err(DenyDecision::new(
                DenyCode::MinNotional,
                STAGE,
                format!("notional {notional} below minimum {}", market.min_notional),
            )
            .with("qty", qty.to_string())
            .with("notional", notional.to_string())
            .with("min_notional", market.min_notional.to_string())
            .into());
        }
        Ok(Quantized { qty, notional })
    }

    /// Returns the predicted latency the decision is priced with.
    fn guards(
        &self,
        intent: &OrderIntent,
        market: &MarketSpec,
        features: &DecisionFeatures,
        measured_latency_ms: f64,
    ) -> Stage<f64> {
        const STAGE: &str = "guards";
        let cfg = &self.config;

        if market.spread_bps >= cfg.spread_deny_bps {
            return Err(DenyDecision::new(
                DenyCode::SpreadDeny,
                STAGE,
                format!(
                    "spread {} bps at or above ceiling {}",
                    market.spread_bps, cfg.spread_deny_bps
                ),
            )
            .with("spread_bps", market.spread_bps.to_string())
            .with("spread_deny_bps", cfg.spread_deny_bps.to_string())
            .into());
        }

        let latency_ms = features.predicted_latency_ms.unwrap_or(measured_latency_ms);
        let Some(latency_dec) = f64_to_decimal(latency_ms).filter(|l| *l >= Decimal::ZERO) else {
            return Err(DenyDecision::new(
                DenyCode::SlaPredict,
                STAGE,
                format!("latency prediction unavailable ({latency_ms})"),
            )
            .into());
        };
        if latency_ms > cfg.max_latency_ms {
            return Err(DenyDecision::new(
                DenyCode::SlaLatency,
                STAGE,
                format!(
                    "predicted latency {latency_ms}ms exceeds SLA {}ms",
                    cfg.max_latency_ms
                ),
            )
            .with("latency_ms", latency_ms)
            .with("max_latency_ms", cfg.max_latency_ms)
            .into());
        }

        let lat_cost = self.edge.lat_cost(latency_dec)?;
        let edge_after_latency = intent.expected_return_bps + lat_cost;
        if edge_after_latency <= cfg.edge_floor_bps {
            return Err(DenyDecision::new(
                DenyCode::EdgeFloor,
                STAGE,
                format!(
                    "edge after latency {edge_after_latency} bps at or below floor {}",
                    cfg.edge_floor_bps
                ),
            )
            .with("expected_return_bps", intent.expected_return_bps.to_string())
            .with("lat_cost_bps", lat_cost.to_string())
            .with("edge_floor_bps", cfg.edge_floor_bps.to_string())
            .into());
        }
        Ok(latency_ms)
    }

    fn decide(
        &self,
        intent: &OrderIntent,
        market: &MarketSpec,
        features: &DecisionFeatures,
        latency_ms: f64,
    ) -> Stage<Decided> {
        const STAGE: &str = "decide";
        let cfg = &self.config;

        let spread_f64 = market.spread_bps.to_f64().unwrap_or(f64::INFINITY);
        let p_fill = match features.p_fill {
            Some(p) => p,
            None => self.fill_model.p_fill(
                intent.side,
                features.queue_position,
                features.depth_at_price,
                features.obi,
                spread_f64,
                features.horizon_ms,
            ),
        };

        let inputs = EdgeInputs {
            raw_edge_bps: intent.expected_return_bps,
            half_spread_bps: market.half_spread_bps(),
            maker_fee_bps: market.maker_fee_bps,
            taker_fee_bps: market.taker_fee_bps,
            predicted_latency_ms: import(latency_ms, "latency")?,
            slippage_bps: import(features.slippage_bps, "slippage")?,
            adverse_selection_bps: import(features.adverse_selection_bps, "adverse selection")?,
            p_fill: import(p_fill, "p_fill")?,
        };
        let estimate = self.edge.estimate(&inputs)?;
        let (e_maker, e_taker) = (estimate.e_maker_bps, estimate.e_taker_bps);

        let tif = intent.prefs.tif;
        let viable = p_fill >= cfg.p_min_fill
            && market.spread_bps <= cfg.maker_spread_ok_bps
            && !tif.forbids_resting();

        let mut diagnostics = Diagnostics::new();
        diagnostics.insert("p_fill".into(), json!(p_fill));
        diagnostics.insert("maker_viable".into(), json!(viable));
        diagnostics.insert("e_maker_bps".into(), json!(e_maker.to_string()));
        diagnostics.insert("e_taker_bps".into(), json!(e_taker.to_string()));
        diagnostics.insert("spread_bps".into(), json!(market.spread_bps.to_string()));
        diagnostics.insert("post_only".into(), json!(intent.prefs.post_only));
        diagnostics.insert("tif".into(), json!(tif.to_string()));

        if intent.prefs.post_only && !viable && tif.forbids_resting() {
            return Err(DenyDecision::new(
                DenyCode::PostOnlyUnavailable,
                STAGE,
                format!("post-only requested with {tif}, no resting route available"),
            )
            .with_diagnostics(diagnostics)
            .into());
        }

        let maker_ok = viable && e_maker > Decimal::ZERO;
        let selection = if maker_ok
            && (intent.prefs.post_only || e_maker - e_taker >= cfg.switch_margin_bps)
        {
            Selection::Maker
        } else if e_taker > Decimal::ZERO {
            Selection::Taker
        } else if e_maker > Decimal::ZERO && !viable {
            return Err(DenyDecision::new(
                DenyCode::LowPfill,
                STAGE,
                format!(
                    "maker edge {e_maker} positive but not viable (p_fill {p_fill:.4})"
                ),
            )
            .with_diagnostics(diagnostics)
            .into());
        } else {
            return Err(DenyDecision::new(
                DenyCode::EdgeDeny,
                STAGE,
                format!("no positive expected value (maker {e_maker}, taker {e_taker})"),
            )
            .with_diagnostics(diagnostics)
            .into());
        };

        trace!(
            intent_id = %intent.id,
            ?selection,
            p_fill,
            e_maker = %e_maker,
            e_taker = %e_taker,
            "route selected"
        );
        Ok(Decided {
            selection,
            p_fill,
            inputs,
            estimate,
        })
    }

    /// Maker price behind the touch, with explicit post-only and
    /// percent-price checks.
    fn price(&self, side: OrderSide, market: &MarketSpec) -> Stage<Price> {
        const STAGE: &str = "price";
        let cfg = &self.config;
        let offset = cfg
            .maker_offset_bps
            .checked_mul(market.mid.inner())
            .ok_or(RouterError::Overflow("maker offset"))?
            / BPS_DIVISOR;

        let price = match side {
            OrderSide::Buy => {
                Price::new(market.best_bid.inner() - offset).floor_to_tick(market.tick_size)
            }
            OrderSide::Sell => {
                Price::new(market.best_ask.inner() + offset).ceil_to_tick(market.tick_size)
            }
        };

        let crosses = match side {
            OrderSide::Buy => price > market.best_bid,
            OrderSide::Sell => price < market.best_ask,
        };
        if crosses {
            return Err(DenyDecision::new(
                DenyCode::PostOnlyBreach,
                STAGE,
                format!("{side} maker price {price} would cross the opposing quote"),
            )
            .with("price", price.to_string())
            .with("best_bid", market.best_bid.to_string())
            .with("best_ask", market.best_ask.to_string())
            .into());
        }

        let deviation = price
            .bps_from(market.mid)
            .ok_or(RouterError::NonFinite("percent price"))?
            .abs();
        if !price.is_positive() || deviation > cfg.percent_price_limit_bps {
            return Err(DenyDecision::new(
                DenyCode::PercentPrice,
                STAGE,
                format!(
                    "maker price {price} deviates {deviation} bps from mid, limit {}",
                    cfg.percent_price_limit_bps
                ),
            )
            .with("price", price.to_string())
            .with("mid", market.mid.to_string())
            .into());
        }
        Ok(price)
    }

    fn finalize(
        &self,
        intent: &OrderIntent,
        quantized: Quantized,
        mode: RouteMode,
        decided: Decided,
    ) -> Stage<RoutedOrderPlan> {
        const STAGE: &str = "finalize";
        let budget: EdgeBudget = match mode {
            RouteMode::Maker { .. } => self.edge.maker_budget(&decided.inputs)?,
            RouteMode::Taker => self.edge.taker_budget(&decided.inputs)?,
        };

        if budget.net_after_tca <= 0 {
            return Err(DenyDecision::new(
                DenyCode::EdgeDeny,
                STAGE,
                format!(
                    "{} net_after_tca {} not positive",
                    mode.as_str(),
                    budget.net_after_tca
                ),
            )
            .with("mode", mode.as_str())
            .with_diagnostics(budget.to_diagnostics())
            .into());
        }

        let (order_type, tif) = match mode {
            RouteMode::Maker { .. } => (OrderType::LimitPostOnly, TimeInForce::Gtc),
            RouteMode::Taker => (
                OrderType::Market,
                match intent.prefs.tif {
                    TimeInForce::Fok => TimeInForce::Fok,
                    _ => TimeInForce::Ioc,
                },
            ),
        };

        debug!(
            intent_id = %intent.id,
            symbol = %intent.symbol,
            mode = mode.as_str(),
            qty = %quantized.qty,
            notional = %quantized.notional,
            net_after_tca = budget.net_after_tca,
            "route planned"
        );

        Ok(RoutedOrderPlan {
            mode,
            order_type,
            tif,
            symbol: intent.symbol.clone(),
            side: intent.side,
            quantity: quantized.qty,
            correlation_id: intent.id.clone(),
            group_id: group_id(&intent.id, &intent.symbol, intent.ts_ms),
            edge: budget,
            p_fill: decided.p_fill,
            e_maker_bps: decided.estimate.e_maker_bps,
            e_taker_bps: decided.estimate.e_taker_bps,
            governance_state: self.config.governance_state.clone(),
        })
    }
}

fn import(value: f64, what: &'static str) -> Result<Decimal, RouterError> {
    f64_to_decimal(value).ok_or(RouterError::NonFinite(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use vela_core::{ExecPrefs, RiskContext};

    fn market_with(spread_bps: Decimal) -> MarketSpec {
        // mid 100, spread expressed via quotes around it
        let half = dec!(100) * spread_bps / dec!(20000);
        MarketSpec::from_quotes(
            "ETHUSDT",
            Price::new(dec!(0.0001)),
            Size::new(dec!(0.01)),
            dec!(5),
            dec!(1),
            dec!(5),
            Price::new(dec!(100) - half),
            Price::new(dec!(100) + half),
        )
    }

    fn intent(post_only: bool, tif: TimeInForce) -> OrderIntent {
        OrderIntent {
            id: "intent-42".into(),
            ts_ms: 1_700_000_000_000,
            symbol: "ETHUSDT".into(),
            side: OrderSide::Buy,
            expected_return_bps: dec!(60),
            stop_distance_bps: dec!(50),
            take_profit_bps: Vec::new(),
            risk: RiskContext {
                equity_usd: dec!(10000),
                cvar_current_usd: None,
                loss_history_usd: Vec::new(),
                portfolio: None,
            },
            prefs: ExecPrefs { post_only, tif },
            quantity_hint: Some(Size::new(dec!(1))),
        }
    }

    fn features(p_fill: f64) -> DecisionFeatures {
        DecisionFeatures {
            p_fill: Some(p_fill),
            predicted_latency_ms: Some(2.0),
            ..Default::default()
        }
    }

    fn engine() -> RouteDecisionEngine {
        RouteDecisionEngine::new(RouterConfig::default(), FillModelConfig::default())
    }

    fn deny_code(d: &Decision) -> Option<DenyCode> {
        d.deny_code()
    }

    #[test]
    fn test_post_only_high_pfill_routes_maker() {
        let d = engine().route(
            &intent(true, TimeInForce::Gtc),
            &market_with(dec!(1.5)),
            &features(0.8),
            None,
            2.0,
        );
        let plan = d.plan().expect("routed");
        assert!(plan.mode.is_maker());
        assert_eq!(plan.order_type, OrderType::LimitPostOnly);
        assert!(plan.edge.net_after_tca > 0);
        assert!(plan.edge.identity_holds());
        let price = plan.mode.price().unwrap();
        assert!(price <= market_with(dec!(1.5)).best_bid);
    }

    #[test]
    fn test_low_pfill_falls_back_to_taker() {
        let d = engine().route(
            &intent(true, TimeInForce::Gtc),
            &market_with(dec!(1.5)),
            &features(0.4),
            None,
            2.0,
        );
        let plan = d.plan().expect("routed");
        assert_eq!(plan.mode, RouteMode::Taker);
        assert_eq!(plan.tif, TimeInForce::Ioc);
        assert_eq!(plan.edge.net_after_tca, 55);
    }

    #[test]
    fn test_low_pfill_with_no_taker_edge_denies() {
        let mut i = intent(false, TimeInForce::Gtc);
        i.expected_return_bps = dec!(5);
        // E_taker = 5 - 0.1 - 0.75 - 5 < 0; E_maker = 0.4 * (5 - 0.1 + 0.375 - 1) > 0
        let d = engine().route(&i, &market_with(dec!(1.5)), &features(0.4), None, 2.0);
        assert_eq!(deny_code(&d), Some(DenyCode::LowPfill));
        assert_eq!(d.deny().unwrap().stage, "decide");
    }

    #[test]
    fn test_post_only_ioc_unavailable() {
        let d = engine().route(
            &intent(true, TimeInForce::Ioc),
            &market_with(dec!(1.5)),
            &features(0.9),
            None,
            2.0,
        );
        assert_eq!(deny_code(&d), Some(DenyCode::PostOnlyUnavailable));
    }

    #[test]
    fn test_missing_quantity_is_invalid() {
        let mut i = intent(false, TimeInForce::Gtc);
        i.quantity_hint = None;
        let d = engine().route(&i, &market_with(dec!(1.5)), &features(0.8), None, 2.0);
        assert_eq!(deny_code(&d), Some(DenyCode::IntentInvalid));
    }

    #[test]
    fn test_symbol_mismatch_is_invalid() {
        let mut i = intent(false, TimeInForce::Gtc);
        i.symbol = "BTCUSDT".into();
        let d = engine().route(&i, &market_with(dec!(1.5)), &features(0.8), None, 2.0);
        assert_eq!(deny_code(&d), Some(DenyCode::IntentInvalid));
    }

    #[test]
    fn test_lot_and_notional_guards() {
        let e = engine();
        let m = market_with(dec!(1.5));
        let i = intent(false, TimeInForce::Gtc);
        let d = e.route(&i, &m, &features(0.8), Some(Size::new(dec!(0.001))), 2.0);
        assert_eq!(deny_code(&d), Some(DenyCode::LotSize));
        // 0.04 * 100 = 4 < 5
        let d = e.route(&i, &m, &features(0.8), Some(Size::new(dec!(0.04))), 2.0);
        assert_eq!(deny_code(&d), Some(DenyCode::MinNotional));
    }

    #[test]
    fn test_quantity_floored_to_lot() {
        let d = engine().route(
            &intent(false, TimeInForce::Gtc),
            &market_with(dec!(1.5)),
            &features(0.8),
            Some(Size::new(dec!(1.239))),
            2.0,
        );
        assert_eq!(d.plan().unwrap().quantity, Size::new(dec!(1.23)));
    }

    #[test]
    fn test_spread_deny() {
        let d = engine().route(
            &intent(false, TimeInForce::Gtc),
            &market_with(dec!(25)),
            &features(0.8),
            None,
            2.0,
        );
        assert_eq!(deny_code(&d), Some(DenyCode::SpreadDeny));
    }

    #[test]
    fn test_latency_guards() {
        let e = engine();
        let m = market_with(dec!(1.5));
        let i = intent(false, TimeInForce::Gtc);
        let mut f = features(0.8);
        f.predicted_latency_ms = Some(9.0);
        assert_eq!(deny_code(&e.route(&i, &m, &f, None, 2.0)), Some(DenyCode::SlaLatency));

        f.predicted_latency_ms = None;
        assert_eq!(deny_code(&e.route(&i, &m, &f, None, f64::NAN)), Some(DenyCode::SlaPredict));
        assert!(e.route(&i, &m, &f, None, 3.0).is_routed());
    }

    #[test]
    fn test_edge_floor() {
        let mut i = intent(false, TimeInForce::Gtc);
        i.expected_return_bps = dec!(0.05);
        // 0.05 - 0.05 * 2 <= 0
        let d = engine().route(&i, &market_with(dec!(1.5)), &features(0.8), None, 2.0);
        assert_eq!(deny_code(&d), Some(DenyCode::EdgeFloor));
    }

    #[test]
    fn test_edge_deny_when_nothing_pays() {
        let mut i = intent(false, TimeInForce::Gtc);
        i.expected_return_bps = dec!(0.5);
        let mut f = features(0.8);
        f.adverse_selection_bps = 10.0;
        let d = engine().route(&i, &market_with(dec!(1.5)), &f, None, 2.0);
        assert_eq!(deny_code(&d), Some(DenyCode::EdgeDeny));
    }

    #[test]
    fn test_finalize_denies_truncated_zero_budget() {
        let mut i = intent(false, TimeInForce::Gtc);
        // E_taker = 5.9 - 0.1 - 0.75 - 5 = 0.05 > 0, but trunc(5.9) - 5 = 0
        i.expected_return_bps = dec!(5.9);
        let d = engine().route(&i, &market_with(dec!(1.5)), &features(0.1), None, 2.0);
        let deny = d.deny().expect("denied");
        assert_eq!(deny.code, DenyCode::EdgeDeny);
        assert_eq!(deny.stage, "finalize");
        assert!(deny.diagnostics.contains_key("edge.net_after_tca"));
    }

    #[test]
    fn test_sell_maker_price_at_or_above_ask() {
        let mut i = intent(true, TimeInForce::Gtc);
        i.side = OrderSide::Sell;
        let config = RouterConfig {
            maker_offset_bps: dec!(1),
            ..Default::default()
        };
        let m = market_with(dec!(1.5));
        let e = RouteDecisionEngine::new(config, FillModelConfig::default());
        let plan = e.route(&i, &m, &features(0.8), None, 2.0);
        let price = plan.plan().unwrap().mode.price().unwrap();
        assert!(price >= m.best_ask);
        // ask 100.0075 + 0.01 offset, ceiled to 0.0001
        assert_eq!(price, Price::new(dec!(100.0175)));
    }

    #[test]
    fn test_percent_price_limit() {
        let config = RouterConfig {
            maker_offset_bps: dec!(600),
            ..Default::default()
        };
        let e = RouteDecisionEngine::new(config, FillModelConfig::default());
        let d = e.route(
            &intent(true, TimeInForce::Gtc),
            &market_with(dec!(1.5)),
            &features(0.8),
            None,
            2.0,
        );
        assert_eq!(deny_code(&d), Some(DenyCode::PercentPrice));
    }

    #[test]
    fn test_group_id_is_deterministic() {
        let e = engine();
        let m = market_with(dec!(1.5));
        let i = intent(false, TimeInForce::Gtc);
        let a = e.route(&i, &m, &features(0.8), None, 2.0);
        let b = e.route(&i, &m, &features(0.8), None, 2.0);
        assert_eq!(a.plan().unwrap().group_id, b.plan().unwrap().group_id);
        assert_eq!(a.plan().unwrap().correlation_id, "intent-42");
    }

    #[test]
    fn test_model_pfill_used_without_override() {
        let mut f = features(0.8);
        f.p_fill = None;
        f.queue_position = 0.0;
        f.depth_at_price = 10.0;
        let d = engine().route(
            &intent(true, TimeInForce::Gtc),
            &market_with(dec!(1.5)),
            &f,
            None,
            2.0,
        );
        let plan = d.plan().unwrap();
        assert!(plan.p_fill > 0.55 && plan.p_fill < 1.0);
        assert!(plan.mode.is_maker());
    }

    proptest! {
        #[test]
        fn prop_routed_plans_hold_invariants(
            ret in -100i64..400,
            spread_tenths in 1i64..300,
            p in 1u32..100,
            lat_tenths in 0i64..100,
            adv_tenths in 0i64..50,
            post_only in any::<bool>(),
            sell in any::<bool>(),
            offset in 0i64..20,
        ) {
            let config = RouterConfig {
                maker_offset_bps: Decimal::new(offset, 1),
                ..Default::default()
            };
            let e = RouteDecisionEngine::new(config, FillModelConfig::default());
            let m = market_with(Decimal::new(spread_tenths, 1));
            let mut i = intent(post_only, TimeInForce::Gtc);
            i.expected_return_bps = Decimal::new(ret, 1);
            if sell {
                i.side = OrderSide::Sell;
            }
            let f = DecisionFeatures {
                p_fill: Some(f64::from(p) / 100.0),
                predicted_latency_ms: Some(lat_tenths as f64 / 10.0),
                adverse_selection_bps: adv_tenths as f64 / 10.0,
                ..Default::default()
            };
            let d = e.route(&i, &m, &f, None, 1.0);
            prop_assert_ne!(d.deny_code(), Some(DenyCode::InternalError));
            if let Some(plan) = d.plan() {
                prop_assert!(plan.edge.identity_holds());
                prop_assert!(plan.edge.sign_gates_hold());
                prop_assert!(plan.edge.net_after_tca > 0);
                if let RouteMode::Maker { price } = plan.mode {
                    match plan.side {
                        OrderSide::Buy => prop_assert!(price <= m.best_bid),
                        OrderSide::Sell => prop_assert!(price >= m.best_ask),
                    }
                }
            }
        }

        #[test]
        fn prop_maker_survives_higher_capture_eta(
            ret in 10i64..400,
            spread_tenths in 1i64..30,
            p in 55u32..100,
        ) {
            let m = market_with(Decimal::new(spread_tenths, 1));
            let mut i = intent(false, TimeInForce::Gtc);
            i.expected_return_bps = Decimal::new(ret, 1);
            let f = features(f64::from(p) / 100.0);

            let half = RouteDecisionEngine::new(RouterConfig::default(), FillModelConfig::default());
            let full = RouteDecisionEngine::new(
                RouterConfig { capture_eta: dec!(1), ..Default::default() },
                FillModelConfig::default(),
            );
            let at_half = half.route(&i, &m, &f, None, 2.0);
            let at_full = full.route(&i, &m, &f, None, 2.0);
            if let (Some(a), Some(b)) = (at_half.plan(), at_full.plan()) {
                prop_assert!(b.e_maker_bps >= a.e_maker_bps);
            }
            if at_half.plan().map(|p| p.mode.is_maker()).unwrap_or(false) {
                let b = at_full.plan();
                prop_assert!(b.map(|p| p.mode.is_maker()).unwrap_or(false));
            }
        }
    }
}
