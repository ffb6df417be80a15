//! Maker/taker expected value and the integer edge budget.
//!
//! Expected values (bps, exact decimal):
//!
//! ```text
//! lat_cost = -kappa * latency_ms
//! rebate   = max(0, taker_fee - maker_fee)   (rebate_mode only)
//! E_maker  = p * (raw + lat_cost + eta * half_spread + rebate - maker_fee - adv)
//! E_taker  = raw + lat_cost - half_spread - taker_fee - adv - slippage
//! ```
//!
//! The budget decomposes the selected mode's value into six signed integer
//! components, each truncated toward zero, and `net_after_tca` is their
//! literal sum.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use vela_core::EdgeBudget;

use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult};

/// Normalized, already-validated decision inputs in bps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeInputs {
    /// Expected return in the direction of the order.
    pub raw_edge_bps: Decimal,
    pub half_spread_bps: Decimal,
    pub maker_fee_bps: Decimal,
    pub taker_fee_bps: Decimal,
    pub predicted_latency_ms: Decimal,
    /// Taker impact beyond the half-spread (magnitude).
    pub slippage_bps: Decimal,
    /// Adverse-selection cost (magnitude).
    pub adverse_selection_bps: Decimal,
    pub p_fill: Decimal,
}

/// Expected values for both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEstimate {
    pub lat_cost_bps: Decimal,
    pub rebate_bps: Decimal,
    pub e_maker_bps: Decimal,
    pub e_taker_bps: Decimal,
}

impl EdgeEstimate {
    /// Raw edge net of latency decay; the edge-floor guard compares this.
    pub fn edge_after_latency(&self, inputs: &EdgeInputs) -> Decimal {
        inputs.raw_edge_bps + self.lat_cost_bps
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeBudgetCalculator {
    capture_eta: Decimal,
    kappa_bps_per_ms: Decimal,
    rebate_mode: bool,
}

impl EdgeBudgetCalculator {
    pub fn new(capture_eta: Decimal, kappa_bps_per_ms: Decimal, rebate_mode: bool) -> Self {
        Self {
            capture_eta,
            kappa_bps_per_ms,
            rebate_mode,
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(config.capture_eta, config.kappa_bps_per_ms, config.rebate_mode)
    }

    pub fn capture_eta(&self) -> Decimal {
        self.capture_eta
    }

    pub fn lat_cost(&self, latency_ms: Decimal) -> RouterResult<Decimal> {
        Ok(-mul(self.kappa_bps_per_ms, latency_ms.max(Decimal::ZERO), "lat_cost")?)
    }

    pub fn rebate(&self, inputs: &EdgeInputs) -> Decimal {
        if self.rebate_mode {
            (inputs.taker_fee_bps - inputs.maker_fee_bps).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        }
    }

    pub fn estimate(&self, inputs: &EdgeInputs) -> RouterResult<EdgeEstimate> {
        let lat_cost = self.lat_cost(inputs.predicted_latency_ms)?;
        let rebate = self.rebate(inputs);
        let adv = inputs.adverse_selection_bps.abs();
        let capture = mul(self.capture_eta, inputs.half_spread_bps, "capture")?;

        let maker_inner =
            inputs.raw_edge_bps + lat_cost + capture + rebate - inputs.maker_fee_bps - adv;
        let e_maker = mul(inputs.p_fill, maker_inner, "E_maker")?;
        let e_taker = inputs.raw_edge_bps + lat_cost
            - inputs.half_spread_bps
            - inputs.taker_fee_bps
            - adv
            - inputs.slippage_bps.abs();

        Ok(EdgeEstimate {
            lat_cost_bps: lat_cost,
            rebate_bps: rebate,
            e_maker_bps: e_maker,
            e_taker_bps: e_taker,
        })
    }

    /// Integer budget for a maker route.
    ///
    /// Components are scaled by `p_fill`; a negative maker fee is a rebate.
    pub fn maker_budget(&self, inputs: &EdgeInputs) -> RouterResult<EdgeBudget> {
        let p = inputs.p_fill;
        let lat_cost = self.lat_cost(inputs.predicted_latency_ms)?;
        let capture = mul(self.capture_eta, inputs.half_spread_bps, "capture")?;
        let fee = inputs.maker_fee_bps;

        let raw = to_bps(mul(p, inputs.raw_edge_bps + capture, "raw")?, "raw")?;
        let fees = to_bps(-mul(p, fee.max(Decimal::ZERO), "fees")?, "fees")?;
        let adv_sel = to_bps(-mul(p, inputs.adverse_selection_bps.abs(), "adv_sel")?, "adv_sel")?;
        let lat = to_bps(mul(p, lat_cost, "lat_cost")?, "lat_cost")?;
        let rebate_total = self.rebate(inputs) + (-fee).max(Decimal::ZERO);
        let rebates = to_bps(mul(p, rebate_total, "rebates")?, "rebates")?;

        EdgeBudget::from_components(raw, fees, 0, adv_sel, lat, rebates)
            .ok_or(RouterError::Overflow("maker net_after_tca"))
    }

    /// Integer budget for a taker route.
    pub fn taker_budget(&self, inputs: &EdgeInputs) -> RouterResult<EdgeBudget> {
        let fee = inputs.taker_fee_bps;
        let raw = to_bps(inputs.raw_edge_bps, "raw")?;
        let fees = to_bps(-fee.max(Decimal::ZERO), "fees")?;
        let slip_est = to_bps(
            -(inputs.half_spread_bps.abs() + inputs.slippage_bps.abs()),
            "slip_est",
        )?;
        let adv_sel = to_bps(-inputs.adverse_selection_bps.abs(), "adv_sel")?;
        let lat = to_bps(self.lat_cost(inputs.predicted_latency_ms)?, "lat_cost")?;
        let rebates = to_bps((-fee).max(Decimal::ZERO), "rebates")?;

        EdgeBudget::from_components(raw, fees, slip_est, adv_sel, lat, rebates)
            .ok_or(RouterError::Overflow("taker net_after_tca"))
    }
}

fn mul(a: Decimal, b: Decimal, what: &'static str) -> RouterResult<Decimal> {
    a.checked_mul(b).ok_or(RouterError::Overflow(what))
}

/// Truncate toward zero into integer bps.
fn to_bps(value: Decimal, what: &'static str) -> RouterResult<i64> {
    value.trunc().to_i64().ok_or(RouterError::Overflow(what))
}
