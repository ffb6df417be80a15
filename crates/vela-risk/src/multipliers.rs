//! Risk multiplier orchestration.
//!
//! Five independent signals each map to a multiplier in `(0, 1.25]`; the
//! composite is their product clamped to the Kelly bounds. All functions
//! are pure. Non-finite inputs resolve to the most conservative value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vela_core::{DecisionFeatures, Regime};

use crate::config::{KellyBounds, MultiplierConfig};

/// Per-signal multipliers and their clamped product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Multipliers {
    pub cal: f64,
    pub reg: f64,
    pub liq: f64,
    pub dd: f64,
    pub lat: f64,
    pub composite: f64,
}

impl Multipliers {
    /// Named map for audit events.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("cal".to_string(), self.cal),
            ("reg".to_string(), self.reg),
            ("liq".to_string(), self.liq),
            ("dd".to_string(), self.dd),
            ("lat".to_string(), self.lat),
        ])
    }
}

/// Linear ramp from 1.0 at `good` to `floor` at `bad`, flat outside.
fn ramp(x: f64, good: f64, bad: f64, floor: f64) -> f64 {
    if x.is_nan() {
        return floor;
    }
    if x <= good {
        1.0
    } else if x >= bad {
        floor
    } else {
        let t = (x - good) / (bad - good);
        1.0 + t * (floor - 1.0)
    }
}

#[derive(Debug, Clone)]
pub struct RiskMultiplierOrchestrator {
    config: MultiplierConfig,
    bounds: KellyBounds,
}

impl RiskMultiplierOrchestrator {
    pub fn new(config: MultiplierConfig, bounds: KellyBounds) -> Self {
        Self { config, bounds }
    }

    /// Calibration error step function.
    pub fn cal(&self, ece: f64) -> f64 {
        if ece.is_nan() {
            0.6
        } else if ece <= self.config.ece_warn {
            1.0
        } else if ece <= self.config.ece_bad {
            0.8
        } else {
            0.6
        }
    }

    pub fn reg(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Trend => self.config.regime_trend,
            Regime::Grind => self.config.regime_grind,
            Regime::Chaos => self.config.regime_chaos,
            Regime::Other => self.config.regime_other,
        }
    }

    /// Liquidity from half-spread in bps.
    pub fn liq(&self, half_spread_bps: f64) -> f64 {
        let c = &self.config;
        ramp(half_spread_bps, c.liq_good_bps, c.liq_bad_bps, c.liq_floor)
    }

    /// Drawdown fraction.
    pub fn dd(&self, drawdown: f64) -> f64 {
        let c = &self.config;
        ramp(drawdown.abs(), c.dd_good, c.dd_bad, c.dd_floor)
    }

    /// p95 latency in ms.
    pub fn lat(&self, latency_p95_ms: f64) -> f64 {
        let c = &self.config;
        ramp(latency_p95_ms, c.lat_good_ms, c.lat_bad_ms, c.lat_floor)
    }

    /// Evaluate all five signals and the composite.
    pub fn evaluate(&self, features: &DecisionFeatures, half_spread_bps: f64) -> Multipliers {
        let cal = self.cal(features.ece);
        let reg = self.reg(features.regime);
        let liq = self.liq(half_spread_bps);
        let dd = self.dd(features.drawdown);
        let lat = self.lat(features.latency_p95_ms);
        let composite = (cal * reg * liq * dd * lat).clamp(self.bounds.m_min, self.bounds.m_max);
        Multipliers {
            cal,
            reg,
            liq,
            dd,
            lat,
            composite,
        }
    }
}
