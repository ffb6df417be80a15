//! Logistic maker-fill probability.
//!
//! Imbalance is side-relative: `obi > 0` means a bid-heavy book and the
//! model uses `s * obi` with `s = +1` for BUY and `-1` for SELL. As a
//! consequence `p_fill(BUY, x) == p_fill(SELL, -x)`.

use vela_core::OrderSide;

use crate::config::FillModelConfig;

/// Floor applied to the depth divisor.
const DEPTH_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
pub struct FillProbabilityModel {
    coefficients: FillModelConfig,
}

impl FillProbabilityModel {
    pub fn new(coefficients: FillModelConfig) -> Self {
        Self { coefficients }
    }

    pub fn coefficients(&self) -> &FillModelConfig {
        &self.coefficients
    }

    /// Fill probability with the configured coefficients.
    pub fn p_fill(
        &self,
        side: OrderSide,
        queue_pos: f64,
        depth_at_price: f64,
        obi: f64,
        spread_bps: f64,
        horizon_ms: f64,
    ) -> f64 {
        Self::p_fill_with(
            &self.coefficients,
            side,
            queue_pos,
            depth_at_price,
            obi,
            spread_bps,
            horizon_ms,
        )
    }

    /// Fill probability with explicit coefficients.
    ///
    /// Non-finite inputs yield the floor probability.
    pub fn p_fill_with(
        beta: &FillModelConfig,
        side: OrderSide,
        queue_pos: f64,
        depth_at_price: f64,
        obi: f64,
        spread_bps: f64,
        horizon_ms: f64,
    ) -> f64 {
        let eps = beta.epsilon;
        if ![queue_pos, depth_at_price, obi, spread_bps, horizon_ms]
            .iter()
            .all(|v| v.is_finite())
        {
            return eps;
        }

        let q = (queue_pos / depth_at_price.max(DEPTH_EPS)).clamp(0.0, 1.0);
        let imbalance = f64::from(side.sign()) * obi.clamp(-1.0, 1.0);
        let spread = spread_bps.max(0.0);
        let horizon = (horizon_ms.max(0.0) / 1000.0).ln_1p();

        let score = beta.intercept - beta.queue_coef * q + beta.obi_coef * imbalance
            - beta.spread_coef * spread
            + beta.horizon_coef * horizon;
        let p = 1.0 / (1.0 + (-score).exp());
        p.clamp(eps, 1.0 - eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn model() -> FillProbabilityModel {
        FillProbabilityModel::new(FillModelConfig::default())
    }

    #[test]
    fn test_probability_in_open_interval() {
        let m = model();
        let p = m.p_fill(OrderSide::Buy, 0.0, 1.0, 1.0, 0.0, 1e9);
        assert!(p < 1.0);
        let p = m.p_fill(OrderSide::Buy, 1e9, 1.0, -1.0, 1e6, 0.0);
        assert!(p > 0.0);
    }

    #[test]
    fn test_default_front_of_queue_is_viable() {
        let p = model().p_fill(OrderSide::Buy, 0.0, 10.0, 0.0, 1.5, 1000.0);
        assert!(p > 0.55, "p = {p}");
    }

    #[test]
    fn test_side_relative_symmetry() {
        let m = model();
        let buy = m.p_fill(OrderSide::Buy, 2.0, 10.0, 0.3, 1.0, 500.0);
        let sell = m.p_fill(OrderSide::Sell, 2.0, 10.0, -0.3, 1.0, 500.0);
        assert_eq!(buy, sell);
    }

    #[test]
    fn test_non_finite_input_floors() {
        let m = model();
        assert_eq!(m.p_fill(OrderSide::Buy, f64::NAN, 1.0, 0.0, 1.0, 100.0), 1e-6);
    }

    #[test]
    fn test_zero_depth_treated_as_back_of_queue() {
        let m = model();
        let empty = m.p_fill(OrderSide::Buy, 1.0, 0.0, 0.0, 1.0, 100.0);
        let back = m.p_fill(OrderSide::Buy, 1.0, 1.0, 0.0, 1.0, 100.0);
        assert_eq!(empty, back);
    }

    proptest! {
        #[test]
        fn prop_increases_with_horizon(
            h in 0.0f64..60_000.0,
            dh in 1.0f64..60_000.0,
            q in 0.0f64..1.0,
            obi in -1.0f64..1.0,
            spread in 0.0f64..10.0,
        ) {
            let m = model();
            let lo = m.p_fill(OrderSide::Buy, q, 1.0, obi, spread, h);
            let hi = m.p_fill(OrderSide::Buy, q, 1.0, obi, spread, h + dh);
            prop_assert!(hi > lo);
        }

        #[test]
        fn prop_decreases_with_queue_and_spread(
            q in 0.0f64..0.9,
            dq in 0.01f64..0.1,
            spread in 0.0f64..10.0,
            ds in 0.1f64..5.0,
        ) {
            let m = model();
            let base = m.p_fill(OrderSide::Sell, q, 1.0, 0.0, spread, 1000.0);
            let deeper = m.p_fill(OrderSide::Sell, q + dq, 1.0, 0.0, spread, 1000.0);
            let wider = m.p_fill(OrderSide::Sell, q, 1.0, 0.0, spread + ds, 1000.0);
            prop_assert!(deeper < base);
            prop_assert!(wider < base);
        }

        #[test]
        fn prop_increases_with_favoring_imbalance(
            obi in -1.0f64..0.9,
            d in 0.01f64..0.1,
        ) {
            let m = model();
            let buy_lo = m.p_fill(OrderSide::Buy, 0.5, 1.0, obi, 1.0, 1000.0);
            let buy_hi = m.p_fill(OrderSide::Buy, 0.5, 1.0, obi + d, 1.0, 1000.0);
            prop_assert!(buy_hi > buy_lo);
            // For SELL, imbalance favoring the side is negative obi.
            let sell_lo = m.p_fill(OrderSide::Sell, 0.5, 1.0, -obi, 1.0, 1000.0);
            let sell_hi = m.p_fill(OrderSide::Sell, 0.5, 1.0, -(obi + d), 1.0, 1000.0);
            prop_assert!(sell_hi > sell_lo);
        }
    }
}
