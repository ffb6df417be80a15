//! Decision inputs: the trading intent and the per-decision feature feed.
//!
//! Both are immutable values created once per trading decision.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::order::{OrderSide, TimeInForce};
use crate::Size;

/// Market regime label supplied by the external regime classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Trend,
    Grind,
    Chaos,
    #[default]
    #[serde(other)]
    Other,
}

/// Portfolio state used for the covariance-adjusted Kelly fraction.
///
/// `symbols[i]` indexes row/column `i` of `covariance` and
/// `position_values_usd[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioContext {
    pub symbols: Vec<String>,
    /// Covariance of per-unit returns.
    pub covariance: Vec<Vec<f64>>,
    /// Signed existing position values in USD (negative = short).
    pub position_values_usd: Vec<f64>,
}

impl PortfolioContext {
    /// Index of `symbol` in the context, if tracked.
    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    /// Checks that the covariance is square and every vector agrees in length.
    pub fn is_consistent(&self) -> bool {
        let n = self.symbols.len();
        n > 0
            && self.position_values_usd.len() == n
            && self.covariance.len() == n
            && self.covariance.iter().all(|row| row.len() == n)
    }
}

/// Risk context attached to an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContext {
    /// Account equity in USD.
    pub equity_usd: Decimal,
    /// Current portfolio CVaR in USD, if already known.
    #[serde(default)]
    pub cvar_current_usd: Option<f64>,
    /// Historical per-period losses in USD (positive = loss), used to fit
    /// the tail when `cvar_current_usd` is not supplied.
    #[serde(default)]
    pub loss_history_usd: Vec<f64>,
    #[serde(default)]
    pub portfolio: Option<PortfolioContext>,
}

/// Execution preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecPrefs {
    #[serde(default)]
    pub post_only: bool,
    #[serde(default)]
    pub tif: TimeInForce,
}

/// A trading intent. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: String,
    /// Decision timestamp (Unix milliseconds).
    pub ts_ms: u64,
    pub symbol: String,
    pub side: OrderSide,
    /// Expected return in basis points, stated in the direction of `side`.
    pub expected_return_bps: Decimal,
    /// Distance to the protective stop in basis points.
    pub stop_distance_bps: Decimal,
    #[serde(default)]
    pub take_profit_bps: Vec<Decimal>,
    pub risk: RiskContext,
    #[serde(default)]
    pub prefs: ExecPrefs,
    /// Externally-supplied quantity hint.
    #[serde(default)]
    pub quantity_hint: Option<Size>,
}

fn default_queue_position() -> f64 {
    0.0
}

fn default_depth() -> f64 {
    1.0
}

fn default_horizon_ms() -> f64 {
    1000.0
}

/// Per-decision feature feed: risk signals, book microstructure and cost
/// estimates.
///
/// Cost estimates (`slippage_bps`, `adverse_selection_bps`) are magnitudes;
/// the edge budget applies them with a negative sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionFeatures {
    /// Expected calibration error of the forecaster.
    #[serde(default)]
    pub ece: f64,
    #[serde(default)]
    pub regime: Regime,
    /// Portfolio drawdown fraction (0.05 = 5%).
    #[serde(default)]
    pub drawdown: f64,
    /// p95 of recent round-trip latency (ms).
    #[serde(default)]
    pub latency_p95_ms: f64,
    /// Quantity ahead of us at our price level.
    #[serde(default = "default_queue_position")]
    pub queue_position: f64,
    /// Total displayed quantity at our price level.
    #[serde(default = "default_depth")]
    pub depth_at_price: f64,
    /// Order-book imbalance in [-1, 1], positive = bid-heavy.
    #[serde(default)]
    pub obi: f64,
    /// Horizon over which a maker fill is acceptable (ms).
    #[serde(default = "default_horizon_ms")]
    pub horizon_ms: f64,
    /// Externally-estimated fill probability; overrides the logistic model.
    #[serde(default)]
    pub p_fill: Option<f64>,
    /// Expected taker impact beyond the half-spread (bps, magnitude).
    #[serde(default)]
    pub slippage_bps: f64,
    /// Expected adverse-selection cost (bps, magnitude).
    #[serde(default)]
    pub adverse_selection_bps: f64,
    /// Predicted decision-to-venue latency (ms). Falls back to the measured
    /// latency passed alongside the features.
    #[serde(default)]
    pub predicted_latency_ms: Option<f64>,
}

impl Default for DecisionFeatures {
    fn default() -> Self {
        Self {
            ece: 0.0,
            regime: Regime::default(),
            drawdown: 0.0,
            latency_p95_ms: 0.0,
            queue_position: default_queue_position(),
            depth_at_price: default_depth(),
            obi: 0.0,
            horizon_ms: default_horizon_ms(),
            p_fill: None,
            slippage_bps: 0.0,
            adverse_selection_bps: 0.0,
            predicted_latency_ms: None,
        }
    }
}

impl DecisionFeatures {
    /// Build features from the plain key/value map delivered by the risk feed.
    ///
    /// Missing keys take their defaults; unknown keys are ignored so that the
    /// feed can grow without breaking older cores.
    pub fn from_kv(map: &BTreeMap<String, serde_json::Value>) -> Result<Self> {
        let mut features = Self::default();
        for (key, value) in map {
            let num = || {
                value
                    .as_f64()
                    .ok_or_else(|| CoreError::InvalidFeature(format!("{key} is not numeric")))
            };
            match key.as_str() {
                "ece" => features.ece = num()?,
                "drawdown" => features.drawdown = num()?,
                "latency_p95_ms" => features.latency_p95_ms = num()?,
                "queue_position" => features.queue_position = num()?,
                "depth_at_price" => features.depth_at_price = num()?,
                "obi" => features.obi = num()?,
                "horizon_ms" => features.horizon_ms = num()?,
                "p_fill" => features.p_fill = Some(num()?),
                "slippage_bps" => features.slippage_bps = num()?,
                "adverse_selection_bps" => features.adverse_selection_bps = num()?,
                "predicted_latency_ms" => features.predicted_latency_ms = Some(num()?),
                "regime" => {
                    features.regime = serde_json::from_value(value.clone()).unwrap_or_default()
                }
                _ => tracing::trace!(key = %key, "ignoring unknown feature key"),
            }
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_regime_unknown_label_maps_to_other() {
        let r: Regime = serde_json::from_value(json!("mean_revert")).unwrap();
        assert_eq!(r, Regime::Other);
        let r: Regime = serde_json::from_value(json!("chaos")).unwrap();
        assert_eq!(r, Regime::Chaos);
    }

    #[test]
    fn test_features_from_kv() {
        let mut map = BTreeMap::new();
        map.insert("ece".to_string(), json!(0.07));
        map.insert("regime".to_string(), json!("grind"));
        map.insert("p_fill".to_string(), json!(0.8));
        map.insert("vendor_extra".to_string(), json!("x"));

        let f = DecisionFeatures::from_kv(&map).unwrap();
        assert!((f.ece - 0.07).abs() < 1e-12);
        assert_eq!(f.regime, Regime::Grind);
        assert_eq!(f.p_fill, Some(0.8));
        assert_eq!(f.depth_at_price, 1.0);
    }

    #[test]
    fn test_features_from_kv_rejects_non_numeric() {
        let mut map = BTreeMap::new();
        map.insert("drawdown".to_string(), json!("high"));
        assert!(DecisionFeatures::from_kv(&map).is_err());
    }

    #[test]
    fn test_portfolio_consistency() {
        let ctx = PortfolioContext {
            symbols: vec!["A".into(), "B".into()],
            covariance: vec![vec![0.04, 0.01], vec![0.01, 0.09]],
            position_values_usd: vec![1000.0, -500.0],
        };
        assert!(ctx.is_consistent());
        assert_eq!(ctx.index_of("B"), Some(1));

        let bad = PortfolioContext {
            covariance: vec![vec![0.04]],
            ..ctx
        };
        assert!(!bad.is_consistent());
    }
}
