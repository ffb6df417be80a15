//! Route decision outputs.
//!
//! A decision is either a `RoutedOrderPlan` or a `DenyDecision`, never both.
//! Business-rule rejections are values, not errors.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::order::{OrderSide, OrderType, TimeInForce};
use crate::{Price, Size};

/// Diagnostic payload attached to decisions and audit events.
pub type Diagnostics = BTreeMap<String, serde_json::Value>;

/// Integer basis points.
pub type Bps = i64;

/// Signed decomposition of expected profitability, in integer basis points.
///
/// `net_after_tca` is always the literal sum of the six components; the only
/// constructor is [`EdgeBudget::from_components`], which refuses sums that
/// overflow `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeBudget {
    pub raw: Bps,
    /// Venue fees (<= 0).
    pub fees: Bps,
    /// Spread crossing and impact (<= 0).
    pub slip_est: Bps,
    /// Adverse selection (<= 0).
    pub adv_sel: Bps,
    /// Latency decay (<= 0).
    pub lat_cost: Bps,
    /// Rebates and fee savings (>= 0).
    pub rebates: Bps,
    pub net_after_tca: Bps,
}

impl EdgeBudget {
    pub fn from_components(
        raw: Bps,
        fees: Bps,
        slip_est: Bps,
        adv_sel: Bps,
        lat_cost: Bps,
        rebates: Bps,
    ) -> Option<Self> {
        let net_after_tca = checked_sum(&[raw, fees, slip_est, adv_sel, lat_cost, rebates])?;
        Some(Self {
            raw,
            fees,
            slip_est,
            adv_sel,
            lat_cost,
            rebates,
            net_after_tca,
        })
    }

    /// The additive identity between components and net.
    pub fn identity_holds(&self) -> bool {
        checked_sum(&[
            self.raw,
            self.fees,
            self.slip_est,
            self.adv_sel,
            self.lat_cost,
            self.rebates,
        ]) == Some(self.net_after_tca)
    }

    /// Costs are non-positive and rebates non-negative.
    pub fn sign_gates_hold(&self) -> bool {
        self.fees <= 0
            && self.slip_est <= 0
            && self.adv_sel <= 0
            && self.lat_cost <= 0
            && self.rebates >= 0
    }

    pub fn to_diagnostics(&self) -> Diagnostics {
        let mut d = Diagnostics::new();
        d.insert("edge.raw".into(), self.raw.into());
        d.insert("edge.fees".into(), self.fees.into());
        d.insert("edge.slip_est".into(), self.slip_est.into());
        d.insert("edge.adv_sel".into(), self.adv_sel.into());
        d.insert("edge.lat_cost".into(), self.lat_cost.into());
        d.insert("edge.rebates".into(), self.rebates.into());
        d.insert("edge.net_after_tca".into(), self.net_after_tca.into());
        d
    }
}

fn checked_sum(parts: &[Bps]) -> Option<Bps> {
    parts.iter().try_fold(0i64, |acc, p| acc.checked_add(*p))
}

/// Routing mode. Only a maker route carries a limit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RouteMode {
    Maker { price: Price },
    Taker,
}

impl RouteMode {
    pub fn is_maker(&self) -> bool {
        matches!(self, Self::Maker { .. })
    }

    pub fn price(&self) -> Option<Price> {
        match self {
            Self::Maker { price } => Some(*price),
            Self::Taker => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maker { .. } => "maker",
            Self::Taker => "taker",
        }
    }
}

/// A routed order plan ready for the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedOrderPlan {
    pub mode: RouteMode,
    pub order_type: OrderType,
    pub tif: TimeInForce,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Size,
    /// Intent id; carried on every lifecycle event.
    pub correlation_id: String,
    /// Deterministic client/group id.
    pub group_id: String,
    pub edge: EdgeBudget,
    pub p_fill: f64,
    pub e_maker_bps: Decimal,
    pub e_taker_bps: Decimal,
    pub governance_state: String,
}

/// Closed set of deny codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenyCode {
    #[serde(rename = "INTENT_INVALID")]
    IntentInvalid,
    #[serde(rename = "LOT_SIZE")]
    LotSize,
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional,
    #[serde(rename = "SPREAD_DENY")]
    SpreadDeny,
    #[serde(rename = "SLA_LATENCY")]
    SlaLatency,
    #[serde(rename = "SLA_PREDICT")]
    SlaPredict,
    #[serde(rename = "EDGE_FLOOR")]
    EdgeFloor,
    #[serde(rename = "EDGE_DENY")]
    EdgeDeny,
    #[serde(rename = "LOW_PFILL.DENY")]
    LowPfill,
    #[serde(rename = "POST_ONLY_UNAVAILABLE")]
    PostOnlyUnavailable,
    #[serde(rename = "POST_ONLY_BREACH")]
    PostOnlyBreach,
    #[serde(rename = "PERCENT_PRICE")]
    PercentPrice,
    #[serde(rename = "SIZE_ZERO.DENY")]
    SizeZero,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl DenyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntentInvalid => "INTENT_INVALID",
            Self::LotSize => "LOT_SIZE",
            Self::MinNotional => "MIN_NOTIONAL",
            Self::SpreadDeny => "SPREAD_DENY",
            Self::SlaLatency => "SLA_LATENCY",
            Self::SlaPredict => "SLA_PREDICT",
            Self::EdgeFloor => "EDGE_FLOOR",
            Self::EdgeDeny => "EDGE_DENY",
            Self::LowPfill => "LOW_PFILL.DENY",
            Self::PostOnlyUnavailable => "POST_ONLY_UNAVAILABLE",
            Self::PostOnlyBreach => "POST_ONLY_BREACH",
            Self::PercentPrice => "PERCENT_PRICE",
            Self::SizeZero => "SIZE_ZERO.DENY",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for DenyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed deny with enough context to reconstruct the decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenyDecision {
    pub code: DenyCode,
    /// Pipeline stage that denied (e.g., "normalize", "guards").
    pub stage: String,
    pub reason: String,
    pub diagnostics: Diagnostics,
}

impl DenyDecision {
    pub fn new(code: DenyCode, stage: &str, reason: impl Into<String>) -> Self {
        Self {
            code,
            stage: stage.to_string(),
            reason: reason.into(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Attach one diagnostic entry.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.diagnostics.insert(key.to_string(), value.into());
        self
    }

    pub fn with_diagnostics(mut self, extra: Diagnostics) -> Self {
        self.diagnostics.extend(extra);
        self
    }
}

/// Result of a routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Decision {
    Routed(RoutedOrderPlan),
    Denied(DenyDecision),
}

impl Decision {
    pub fn is_routed(&self) -> bool {
        matches!(self, Self::Routed(_))
    }

    pub fn plan(&self) -> Option<&RoutedOrderPlan> {
        match self {
            Self::Routed(plan) => Some(plan),
            Self::Denied(_) => None,
        }
    }

    pub fn deny(&self) -> Option<&DenyDecision> {
        match self {
            Self::Routed(_) => None,
            Self::Denied(deny) => Some(deny),
        }
    }

    pub fn deny_code(&self) -> Option<DenyCode> {
        self.deny().map(|d| d.code)
    }
}
