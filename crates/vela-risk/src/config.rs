//! Sizing and risk configuration.
//!
//! Every option has a named default so a partial TOML section is valid.
//! Unknown keys are rejected at load time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

/// Upper bound of any single multiplier.
pub const MULTIPLIER_CEILING: f64 = 1.25;

/// Bounds applied by the Kelly sizing engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KellyBounds {
    /// Floor of the composite multiplier.
    #[serde(default = "default_m_min")]
    pub m_min: f64,
    /// Ceiling of the composite multiplier.
    #[serde(default = "default_m_max")]
    pub m_max: f64,
    /// Ceiling of the risked equity fraction.
    #[serde(default = "default_f_max")]
    pub f_max: f64,
}

fn default_m_min() -> f64 {
    0.1
}

fn default_m_max() -> f64 {
    1.25
}

fn default_f_max() -> f64 {
    0.25
}

impl Default for KellyBounds {
    fn default() -> Self {
        Self {
            m_min: default_m_min(),
            m_max: default_m_max(),
            f_max: default_f_max(),
        }
    }
}

/// Kelly sizing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KellyConfig {
    /// Fraction of equity risked per trade. Values above 1 are read as an
    /// absolute USD amount.
    #[serde(default = "default_per_trade_risk_fraction")]
    pub per_trade_risk_fraction: Decimal,
    /// Maximum gross leverage for a single position.
    #[serde(default = "default_leverage_max")]
    pub leverage_max: Decimal,
    /// Optional USD exposure cap for a single position.
    #[serde(default)]
    pub exposure_cap_usd: Option<Decimal>,
    #[serde(default)]
    pub kelly_bounds: KellyBounds,
}

fn default_per_trade_risk_fraction() -> Decimal {
    Decimal::new(5, 3)
}

fn default_leverage_max() -> Decimal {
    Decimal::from(3)
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            per_trade_risk_fraction: default_per_trade_risk_fraction(),
            leverage_max: default_leverage_max(),
            exposure_cap_usd: None,
            kelly_bounds: KellyBounds::default(),
        }
    }
}

impl KellyConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if self.per_trade_risk_fraction <= Decimal::ZERO {
            return Err(RiskError::ConfigError(
                "per_trade_risk_fraction must be positive".to_string(),
            ));
        }
        if self.leverage_max <= Decimal::ZERO {
            return Err(RiskError::ConfigError(
                "leverage_max must be positive".to_string(),
            ));
        }
        if let Some(cap) = self.exposure_cap_usd {
            if cap <= Decimal::ZERO {
                return Err(RiskError::ConfigError(
                    "exposure_cap_usd must be positive when set".to_string(),
                ));
            }
        }
        let b = &self.kelly_bounds;
        if !(b.m_min > 0.0 && b.m_min <= b.m_max && b.m_max <= MULTIPLIER_CEILING) {
            return Err(RiskError::ConfigError(format!(
                "kelly_bounds require 0 < m_min <= m_max <= {MULTIPLIER_CEILING}, got ({}, {})",
                b.m_min, b.m_max
            )));
        }
        if !(b.f_max > 0.0 && b.f_max <= 1.0) {
            return Err(RiskError::ConfigError(format!(
                "kelly_bounds.f_max must be in (0, 1], got {}",
                b.f_max
            )));
        }
        Ok(())
    }
}

/// Piecewise multiplier tables.
///
/// Each `*_good` / `*_bad` pair is a breakpoint: at or below `good` the
/// multiplier is 1.0, at or above `bad` it is the `*_floor` value, linear
/// in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiplierConfig {
    #[serde(default = "default_ece_warn")]
    pub ece_warn: f64,
    #[serde(default = "default_ece_bad")]
    pub ece_bad: f64,

    #[serde(default = "default_regime_trend")]
    pub regime_trend: f64,
    #[serde(default = "default_regime_grind")]
    pub regime_grind: f64,
    #[serde(default = "default_regime_chaos")]
    pub regime_chaos: f64,
    #[serde(default = "default_regime_other")]
    pub regime_other: f64,

    /// Half-spread (bps) breakpoints.
    #[serde(default = "default_liq_good_bps")]
    pub liq_good_bps: f64,
    #[serde(default = "default_liq_bad_bps")]
    pub liq_bad_bps: f64,
    #[serde(default = "default_liq_floor")]
    pub liq_floor: f64,

    /// Drawdown fraction breakpoints.
    #[serde(default = "default_dd_good")]
    pub dd_good: f64,
    #[serde(default = "default_dd_bad")]
    pub dd_bad: f64,
    #[serde(default = "default_dd_floor")]
    pub dd_floor: f64,

    /// p95 latency (ms) breakpoints.
    #[serde(default = "default_lat_good_ms")]
    pub lat_good_ms: f64,
    #[serde(default = "default_lat_bad_ms")]
    pub lat_bad_ms: f64,
    #[serde(default = "default_lat_floor")]
    pub lat_floor: f64,
}

fn default_ece_warn() -> f64 {
    0.05
}

fn default_ece_bad() -> f64 {
    0.10
}

fn default_regime_trend() -> f64 {
    1.0
}

fn default_regime_grind() -> f64 {
    0.8
}

fn default_regime_chaos() -> f64 {
    0.6
}

fn default_regime_other() -> f64 {
    1.0
}

fn default_liq_good_bps() -> f64 {
    2.0
}

fn default_liq_bad_bps() -> f64 {
    10.0
}

fn default_liq_floor() -> f64 {
    0.6
}

fn default_dd_good() -> f64 {
    0.05
}

fn default_dd_bad() -> f64 {
    0.15
}

fn default_dd_floor() -> f64 {
    0.4
}

fn default_lat_good_ms() -> f64 {
    5.0
}

fn default_lat_bad_ms() -> f64 {
    15.0
}

fn default_lat_floor() -> f64 {
    0.6
}

impl Default for MultiplierConfig {
    fn default() -> Self {
        Self {
            ece_warn: default_ece_warn(),
            ece_bad: default_ece_bad(),
            regime_trend: default_regime_trend(),
            regime_grind: default_regime_grind(),
            regime_chaos: default_regime_chaos(),
            regime_other: default_regime_other(),
            liq_good_bps: default_liq_good_bps(),
            liq_bad_bps: default_liq_bad_bps(),
            liq_floor: default_liq_floor(),
            dd_good: default_dd_good(),
            dd_bad: default_dd_bad(),
            dd_floor: default_dd_floor(),
            lat_good_ms: default_lat_good_ms(),
            lat_bad_ms: default_lat_bad_ms(),
            lat_floor: default_lat_floor(),
        }
    }
}

fn in_multiplier_range(v: f64) -> bool {
    v > 0.0 && v <= MULTIPLIER_CEILING
}

impl MultiplierConfig {
    pub fn validate(&self) -> RiskResult<()> {
        let breakpoints = [
            ("ece", self.ece_warn, self.ece_bad),
            ("liq", self.liq_good_bps, self.liq_bad_bps),
            ("dd", self.dd_good, self.dd_bad),
            ("lat", self.lat_good_ms, self.lat_bad_ms),
        ];
        for (name, good, bad) in breakpoints {
            if !(good.is_finite() && bad.is_finite() && good >= 0.0 && good < bad) {
                return Err(RiskError::ConfigError(format!(
                    "{name} breakpoints must satisfy 0 <= good < bad, got ({good}, {bad})"
                )));
            }
        }
        let values = [
            ("regime_trend", self.regime_trend),
            ("regime_grind", self.regime_grind),
            ("regime_chaos", self.regime_chaos),
            ("regime_other", self.regime_other),
            ("liq_floor", self.liq_floor),
            ("dd_floor", self.dd_floor),
            ("lat_floor", self.lat_floor),
        ];
        for (name, v) in values {
            if !in_multiplier_range(v) {
                return Err(RiskError::ConfigError(format!(
                    "{name} must be in (0, {MULTIPLIER_CEILING}], got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Tail-risk (GPD / CVaR) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TailRiskConfig {
    /// Portfolio CVaR budget in USD. Unset means unlimited.
    #[serde(default)]
    pub cvar_limit_usd: Option<f64>,
    /// Empirical quantile used as the peaks-over-threshold cutoff.
    #[serde(default = "default_tail_quantile")]
    pub tail_quantile: f64,
    /// Confidence level for CVaR queries.
    #[serde(default = "default_cvar_alpha")]
    pub cvar_alpha: f64,
    /// Minimum exceedances for a non-degenerate fit.
    #[serde(default = "default_min_exceedances")]
    pub min_exceedances: usize,
}

fn default_tail_quantile() -> f64 {
    0.90
}

fn default_cvar_alpha() -> f64 {
    0.99
}

fn default_min_exceedances() -> usize {
    5
}

impl Default for TailRiskConfig {
    fn default() -> Self {
        Self {
            cvar_limit_usd: None,
            tail_quantile: default_tail_quantile(),
            cvar_alpha: default_cvar_alpha(),
            min_exceedances: default_min_exceedances(),
        }
    }
}

impl TailRiskConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if let Some(limit) = self.cvar_limit_usd {
            if !limit.is_finite() || limit < 0.0 {
                return Err(RiskError::ConfigError(format!(
                    "cvar_limit_usd must be finite and non-negative, got {limit}"
                )));
            }
        }
        if !(self.tail_quantile > 0.0 && self.tail_quantile < 1.0) {
            return Err(RiskError::ConfigError(format!(
                "tail_quantile must be in (0, 1), got {}",
                self.tail_quantile
            )));
        }
        if !(self.cvar_alpha > 0.0 && self.cvar_alpha < 1.0) {
            return Err(RiskError::ConfigError(format!(
                "cvar_alpha must be in (0, 1), got {}",
                self.cvar_alpha
            )));
        }
        if self.min_exceedances < 2 {
            return Err(RiskError::ConfigError(
                "min_exceedances must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
