//! Routing configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RouterError, RouterResult};

/// Route decision thresholds and edge-budget parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Minimum fill probability for a viable maker route.
    #[serde(default = "default_p_min_fill")]
    pub p_min_fill: f64,
    /// Widest spread (bps) at which a maker route is viable.
    #[serde(default = "default_maker_spread_ok_bps")]
    pub maker_spread_ok_bps: Decimal,
    /// Spread (bps) at or above which every route is denied.
    #[serde(default = "default_spread_deny_bps")]
    pub spread_deny_bps: Decimal,
    /// Required maker advantage over taker (bps).
    #[serde(default = "default_switch_margin_bps")]
    pub switch_margin_bps: Decimal,
    /// Maker price offset behind the touch, as bps of mid.
    #[serde(default)]
    pub maker_offset_bps: Decimal,
    /// Maximum maker price deviation from mid (bps).
    #[serde(default = "default_percent_price_limit_bps")]
    pub percent_price_limit_bps: Decimal,
    /// Share of the half-spread a maker fill captures.
    #[serde(default = "default_capture_eta")]
    pub capture_eta: Decimal,
    /// Credit the taker/maker fee difference to maker routes.
    #[serde(default)]
    pub rebate_mode: bool,
    /// Edge decay per millisecond of predicted latency.
    #[serde(default = "default_kappa_bps_per_ms")]
    pub kappa_bps_per_ms: Decimal,
    /// Latency SLA ceiling (ms).
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: f64,
    /// Edge after latency must exceed this floor (bps).
    #[serde(default)]
    pub edge_floor_bps: Decimal,
    /// Tag carried on every routed plan.
    #[serde(default = "default_governance_state")]
    pub governance_state: String,
}

fn default_p_min_fill() -> f64 {
    0.55
}

fn default_maker_spread_ok_bps() -> Decimal {
    Decimal::from(3)
}

fn default_spread_deny_bps() -> Decimal {
    Decimal::from(25)
}

fn default_switch_margin_bps() -> Decimal {
    Decimal::new(5, 1)
}

fn default_percent_price_limit_bps() -> Decimal {
    Decimal::from(500)
}

fn default_capture_eta() -> Decimal {
    Decimal::new(5, 1)
}

fn default_kappa_bps_per_ms() -> Decimal {
    Decimal::new(5, 2)
}

fn default_max_latency_ms() -> f64 {
    8.0
}

fn default_governance_state() -> String {
    "active".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            p_min_fill: default_p_min_fill(),
            maker_spread_ok_bps: default_maker_spread_ok_bps(),
            spread_deny_bps: default_spread_deny_bps(),
            switch_margin_bps: default_switch_margin_bps(),
            maker_offset_bps: Decimal::ZERO,
            percent_price_limit_bps: default_percent_price_limit_bps(),
            capture_eta: default_capture_eta(),
            rebate_mode: false,
            kappa_bps_per_ms: default_kappa_bps_per_ms(),
            max_latency_ms: default_max_latency_ms(),
            edge_floor_bps: Decimal::ZERO,
            governance_state: default_governance_state(),
        }
    }
}

impl RouterConfig {
    pub fn validate(&self) -> RouterResult<()> {
        if !(self.p_min_fill > 0.0 && self.p_min_fill < 1.0) {
            return Err(RouterError::ConfigError(format!(
                "p_min_fill must be in (0, 1), got {}",
                self.p_min_fill
            )));
        }
        if self.capture_eta < Decimal::ZERO || self.capture_eta > Decimal::ONE {
            return Err(RouterError::ConfigError(format!(
                "capture_eta must be in [0, 1], got {}",
                self.capture_eta
            )));
        }
        if self.maker_spread_ok_bps < Decimal::ZERO || self.spread_deny_bps <= Decimal::ZERO {
            return Err(RouterError::ConfigError(
                "spread thresholds must be non-negative".to_string(),
            ));
        }
        if self.maker_offset_bps < Decimal::ZERO {
            return Err(RouterError::ConfigError(
                "maker_offset_bps must be non-negative".to_string(),
            ));
        }
        if self.percent_price_limit_bps <= Decimal::ZERO {
            return Err(RouterError::ConfigError(
                "percent_price_limit_bps must be positive".to_string(),
            ));
        }
        if self.kappa_bps_per_ms < Decimal::ZERO {
            return Err(RouterError::ConfigError(
                "kappa_bps_per_ms must be non-negative".to_string(),
            ));
        }
        if !(self.max_latency_ms.is_finite() && self.max_latency_ms > 0.0) {
            return Err(RouterError::ConfigError(format!(
                "max_latency_ms must be positive, got {}",
                self.max_latency_ms
            )));
        }
        Ok(())
    }
}

/// Logistic fill-model coefficients.
///
/// `score = intercept - queue * q + obi * s*obi - spread * spread_bps
///          + horizon * ln(1 + horizon_s)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FillModelConfig {
    #[serde(default = "default_intercept")]
    pub intercept: f64,
    #[serde(default = "default_queue_coef")]
    pub queue_coef: f64,
    #[serde(default = "default_obi_coef")]
    pub obi_coef: f64,
    #[serde(default = "default_spread_coef")]
    pub spread_coef: f64,
    #[serde(default = "default_horizon_coef")]
    pub horizon_coef: f64,
    /// Output is kept inside `(epsilon, 1 - epsilon)`.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_intercept() -> f64 {
    0.5
}

fn default_queue_coef() -> f64 {
    2.0
}

fn default_obi_coef() -> f64 {
    0.8
}

fn default_spread_coef() -> f64 {
    0.2
}

fn default_horizon_coef() -> f64 {
    0.6
}

fn default_epsilon() -> f64 {
    1e-6
}

impl Default for FillModelConfig {
    fn default() -> Self {
        Self {
            intercept: default_intercept(),
            queue_coef: default_queue_coef(),
            obi_coef: default_obi_coef(),
            spread_coef: default_spread_coef(),
            horizon_coef: default_horizon_coef(),
            epsilon: default_epsilon(),
        }
    }
}

impl FillModelConfig {
    pub fn validate(&self) -> RouterResult<()> {
        let slopes = [
            ("queue_coef", self.queue_coef),
            ("obi_coef", self.obi_coef),
            ("spread_coef", self.spread_coef),
            ("horizon_coef", self.horizon_coef),
        ];
        for (name, v) in slopes {
            if !(v.is_finite() && v > 0.0) {
                return Err(RouterError::ConfigError(format!(
                    "{name} must be positive, got {v}"
                )));
            }
        }
        if !self.intercept.is_finite() {
            return Err(RouterError::ConfigError("intercept must be finite".to_string()));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 0.5) {
            return Err(RouterError::ConfigError(format!(
                "epsilon must be in (0, 0.5), got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}
