//! Risk-adjusted Kelly sizing.
//!
//! Pipeline: per-unit dollar risk -> base quantity -> composite multiplier
//! -> leverage/exposure caps -> lot quantization with min-notional bump ->
//! optional portfolio rescale -> CVaR admission.
//!
//! Every sizing call emits `KELLY.APPLIED`; a failed CVaR admission also
//! emits `CVAR.SHIFT`.

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::DVector;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use vela_core::{
    emit_guarded, event_codes, f64_to_decimal, DecisionFeatures, EventFields, EventSink,
    MarketSpec, OrderIntent, PortfolioContext, Size, BPS_DIVISOR,
};

use crate::config::{KellyConfig, MultiplierConfig, TailRiskConfig};
use crate::error::{RiskError, RiskResult};
use crate::multipliers::{Multipliers, RiskMultiplierOrchestrator};
use crate::shrinkage::{PortfolioShrinkage, VARIANCE_EPS};
use crate::tail::TailRiskGate;

/// Smallest per-unit dollar risk used as a divisor.
const MIN_UNIT_RISK: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Outcome of one sizing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KellyApplied {
    /// Risked equity fraction before any adjustment, capped at `f_max`.
    pub raw_fraction: f64,
    /// Fraction after the portfolio covariance adjustment.
    pub portfolio_fraction: f64,
    pub multipliers: BTreeMap<String, f64>,
    pub composite_multiplier: f64,
    /// Equity fraction actually at risk for `qty_final`.
    pub final_fraction: f64,
    /// Zero, or a lot multiple meeting the minimum notional.
    pub qty_final: Size,
    pub shrinkage_delta: Option<f64>,
    pub cvar_current_usd: Option<f64>,
    pub cvar_delta_usd: f64,
    pub cvar_allowed: bool,
}

struct PortfolioAdjustment {
    scale: Decimal,
    fraction: f64,
    delta: f64,
}

pub struct KellySizingEngine {
    config: KellyConfig,
    orchestrator: RiskMultiplierOrchestrator,
    shrinkage: PortfolioShrinkage,
    tail: TailRiskGate,
    sink: Arc<dyn EventSink>,
}

impl KellySizingEngine {
    pub fn new(
        config: KellyConfig,
        multipliers: MultiplierConfig,
        tail: TailRiskConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let orchestrator = RiskMultiplierOrchestrator::new(multipliers, config.kelly_bounds);
        Self {
            config,
            orchestrator,
            shrinkage: PortfolioShrinkage::new(),
            tail: TailRiskGate::new(tail),
            sink,
        }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &RiskMultiplierOrchestrator {
        &self.orchestrator
    }

    /// Size `intent` against `market`.
    pub fn size(
        &self,
        intent: &OrderIntent,
        market: &MarketSpec,
        features: &DecisionFeatures,
    ) -> RiskResult<KellyApplied> {
        let mid = market.mid.inner();
        let equity = intent.risk.equity_usd;
        if mid <= Decimal::ZERO {
            return Err(RiskError::InvalidInput(format!("non-positive mid {mid}")));
        }
        if equity <= Decimal::ZERO {
            return Err(RiskError::InvalidInput(format!(
                "non-positive equity {equity}"
            )));
        }
        if intent.stop_distance_bps < Decimal::ZERO {
            return Err(RiskError::InvalidInput(format!(
                "negative stop distance {}",
                intent.stop_distance_bps
            )));
        }

        let stop_frac = intent.stop_distance_bps / BPS_DIVISOR;
        let unit_risk = mul(stop_frac, mid, "unit risk")?.max(MIN_UNIT_RISK);

        let risk_capital = if self.config.per_trade_risk_fraction > Decimal::ONE {
            self.config.per_trade_risk_fraction
        } else {
            mul(self.config.per_trade_risk_fraction, equity, "risk capital")?
        };
        let f_max = f64_to_decimal(self.config.kelly_bounds.f_max)
            .ok_or(RiskError::NonFinite("f_max"))?;
        let raw_fraction = div(risk_capital, equity, "raw fraction")?.min(f_max);
        let risk_capital = mul(raw_fraction, equity, "risk capital")?;
        let q_base = div(risk_capital, unit_risk, "base quantity")?;

        let half_spread = market.half_spread_bps().to_f64().unwrap_or(f64::INFINITY);
        let mults = self.orchestrator.evaluate(features, half_spread);
        let m = f64_to_decimal(mults.composite).ok_or(RiskError::NonFinite("multiplier"))?;
        let q_adj = mul(q_base, m, "adjusted quantity")?;

        let cap = self.quantity_cap(equity, mid)?;
        let mut qty = quantize(q_adj, cap, market)?;

        let raw_f64 = raw_fraction.to_f64().unwrap_or(0.0);
        let mut portfolio_fraction = raw_f64;
        let mut shrinkage_delta = None;
        if let Some(portfolio) = &intent.risk.portfolio {
            if let Some(adj) = self.portfolio_adjustment(portfolio, intent, market, qty, raw_f64)? {
                portfolio_fraction = adj.fraction;
                shrinkage_delta = Some(adj.delta);
                if adj.scale < Decimal::ONE {
                    let scaled = mul(qty.inner(), adj.scale, "portfolio rescale")?;
                    qty = quantize(scaled, cap, market)?;
                }
            } else {
                debug!(
                    symbol = %intent.symbol,
                    "symbol not in portfolio context, skipping covariance adjustment"
                );
            }
        }

        let cvar_current = match intent.risk.cvar_current_usd {
            Some(c) => Some(c),
            None if !intent.risk.loss_history_usd.is_empty() => {
                let fit = self.tail.fit(&intent.risk.loss_history_usd)?;
                Some(fit.cvar(self.tail.config().cvar_alpha))
            }
            None => None,
        };
        let limit = self.tail.config().cvar_limit_usd.unwrap_or(f64::INFINITY);
        let cvar_delta = mul(qty.notional(market.mid), stop_frac, "cvar delta")?
            .to_f64()
            .unwrap_or(f64::INFINITY);
        let cvar_allowed =
            TailRiskGate::allow_trade(cvar_current.unwrap_or(0.0), cvar_delta, limit);
        if !cvar_allowed {
            info!(
                symbol = %intent.symbol,
                cvar_current = ?cvar_current,
                cvar_delta,
                limit,
                "CVaR budget exceeded, size forced to zero"
            );
            let mut fields = EventFields::new();
            fields.insert("correlation_id".into(), json!(intent.id));
            fields.insert("symbol".into(), json!(intent.symbol));
            fields.insert("cvar_current_usd".into(), json!(cvar_current));
            fields.insert("cvar_delta_usd".into(), json!(cvar_delta));
            fields.insert("cvar_limit_usd".into(), json!(self.tail.config().cvar_limit_usd));
            fields.insert("qty_before".into(), json!(qty.to_string()));
            emit_guarded(self.sink.as_ref(), event_codes::CVAR_SHIFT, &fields);
            qty = Size::ZERO;
        }

        let at_risk = mul(qty.inner(), unit_risk, "final risk")?;
        let final_fraction = div(at_risk, equity, "final fraction")?
            .to_f64()
            .unwrap_or(0.0);

        let applied = KellyApplied {
            raw_fraction: raw_f64,
            portfolio_fraction,
            multipliers: mults.to_map(),
            composite_multiplier: mults.composite,
            final_fraction,
            qty_final: qty,
            shrinkage_delta,
            cvar_current_usd: cvar_current,
            cvar_delta_usd: cvar_delta,
            cvar_allowed,
        };
        self.emit_applied(intent, &mults, &applied);

        debug!(
            symbol = %intent.symbol,
            qty = %applied.qty_final,
            composite = applied.composite_multiplier,
            final_fraction = applied.final_fraction,
            "kelly sizing applied"
        );
        Ok(applied)
    }

    /// Leverage and exposure ceiling in units.
    fn quantity_cap(&self, equity: Decimal, mid: Decimal) -> RiskResult<Decimal> {
        let gross = mul(equity, self.config.leverage_max, "leverage cap")?;
        let mut cap = div(gross, mid, "leverage cap")?;
        if let Some(exposure) = self.config.exposure_cap_usd {
            cap = cap.min(div(exposure, mid, "exposure cap")?);
        }
        Ok(cap)
    }

    /// Rescale factor from the candidate portfolio's variance.
    ///
    /// The standalone trade variance sets the reference: adding this trade to
    /// correlated existing positions shrinks the fraction in proportion to
    /// `v_solo / v_candidate`. Hedging positions never scale up.
    fn portfolio_adjustment(
        &self,
        portfolio: &PortfolioContext,
        intent: &OrderIntent,
        market: &MarketSpec,
        qty: Size,
        f_raw: f64,
    ) -> RiskResult<Option<PortfolioAdjustment>> {
        if !portfolio.is_consistent() {
            return Err(RiskError::DimensionMismatch(format!(
                "portfolio context with {} symbols is inconsistent",
                portfolio.symbols.len()
            )));
        }
        let Some(idx) = portfolio.index_of(&intent.symbol) else {
            return Ok(None);
        };

        let sigma = PortfolioShrinkage::matrix_from_rows(&portfolio.covariance)?;
        let (sigma_hat, delta) = self.shrinkage.shrink(&sigma)?;

        let equity = intent
            .risk
            .equity_usd
            .to_f64()
            .ok_or(RiskError::NonFinite("equity"))?;
        let trade_value = f64::from(intent.side.sign())
            * qty.notional(market.mid).to_f64().unwrap_or(0.0);

        let n = portfolio.symbols.len();
        let mut w_candidate = DVector::from_iterator(
            n,
            portfolio.position_values_usd.iter().map(|v| v / equity),
        );
        w_candidate[idx] += trade_value / equity;
        let mut w_solo = DVector::<f64>::zeros(n);
        w_solo[idx] = trade_value / equity;

        let v_solo = w_solo.dot(&(&sigma_hat * &w_solo));
        let fraction = self.shrinkage.compute_portfolio_fraction(
            f_raw * v_solo,
            &w_candidate,
            &sigma_hat,
            f_raw,
            VARIANCE_EPS,
        )?;
        let ratio = if f_raw > 0.0 {
            (fraction / f_raw).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let scale = f64_to_decimal(ratio).ok_or(RiskError::NonFinite("portfolio scale"))?;

        debug!(
            symbol = %intent.symbol,
            delta,
            v_solo,
            fraction,
            "portfolio adjustment"
        );
        Ok(Some(PortfolioAdjustment {
            scale,
            fraction,
            delta,
        }))
    }

    fn emit_applied(&self, intent: &OrderIntent, mults: &Multipliers, applied: &KellyApplied) {
        let mut fields = EventFields::new();
        fields.insert("correlation_id".into(), json!(intent.id));
        fields.insert("symbol".into(), json!(intent.symbol));
        fields.insert("raw_fraction".into(), json!(applied.raw_fraction));
        fields.insert("portfolio_fraction".into(), json!(applied.portfolio_fraction));
        fields.insert("multipliers".into(), json!(mults.to_map()));
        fields.insert("composite".into(), json!(mults.composite));
        fields.insert("final_fraction".into(), json!(applied.final_fraction));
        fields.insert("qty_final".into(), json!(applied.qty_final.to_string()));
        fields.insert("cvar_allowed".into(), json!(applied.cvar_allowed));
        emit_guarded(self.sink.as_ref(), event_codes::KELLY_APPLIED, &fields);
    }
}

/// Floor to lot under `cap`; bump to the smallest lot multiple meeting the
/// minimum notional when that still fits under `cap`, else zero.
fn quantize(q: Decimal, cap: Decimal, market: &MarketSpec) -> RiskResult<Size> {
    if q <= Decimal::ZERO || cap <= Decimal::ZERO {
        return Ok(Size::ZERO);
    }
    let lot = market.lot_size;
    let sized = Size::new(q.min(cap)).floor_to_lot(lot);
    if sized.notional(market.mid) >= market.min_notional && sized.is_positive() {
        return Ok(sized);
    }
    let needed = div(market.min_notional, market.mid.inner(), "min notional bump")?;
    let bump = Size::new(needed).ceil_to_lot(lot);
    let bump = if bump.is_zero() { lot } else { bump };
    if bump.inner() <= cap && bump.notional(market.mid) >= market.min_notional {
        Ok(bump)
    } else {
        Ok(Size::ZERO)
    }
}

fn mul(a: Decimal, b: Decimal, what: &'static str) -> RiskResult<Decimal> {
    a.checked_mul(b).ok_or(RiskError::Overflow(what))
}

fn div(a: Decimal, b: Decimal, what: &'static str) -> RiskResult<Decimal> {
    a.checked_div(b).ok_or(RiskError::Overflow(what))
}
