//! Child-order lifecycle types.
//!
//! State machine:
//!
//! ```text
//! PENDING -> OPEN -> { PARTIAL <-> OPEN } -> { ESCALATED | CLEANUP } -> CLOSED
//! PENDING -> REJECTED -> ( PENDING retry | FAILED )
//! OPEN / PARTIAL -> CLEANUP on external trigger
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::order::OrderSide;
use crate::{Price, Size};

/// State of a child order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    /// Created, not yet acknowledged by the venue.
    #[default]
    Pending,
    /// Acknowledged and resting.
    Open,
    /// Partially filled, remainder resting.
    Partial,
    /// Converted to an aggressive IOC order.
    Escalated,
    /// Cancel requested by an external trigger.
    Cleanup,
    /// Fully filled or cancelled.
    Closed,
    /// Rejected by the venue; transient while a retry budget remains.
    Rejected,
    /// Retries exhausted.
    Failed,
}

impl OrderState {
    /// Terminal states never transition again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Active states are eligible for cleanup.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Open | Self::Partial)
    }

    /// States in which the venue may still report fills.
    #[must_use]
    pub fn accepts_fills(&self) -> bool {
        matches!(
            self,
            Self::Open | Self::Partial | Self::Escalated | Self::Cleanup | Self::Pending
        )
    }

    /// Whether the state machine permits `self -> next`.
    #[must_use]
    pub fn can_transition(&self, next: OrderState) -> bool {
        use OrderState::*;
        match (self, next) {
            (Pending, Open | Rejected | Closed | Cleanup | Partial) => true,
            (Open, Partial | Escalated | Cleanup | Closed) => true,
            (Partial, Open | Partial | Escalated | Cleanup | Closed) => true,
            (Escalated, Escalated | Closed) => true,
            (Cleanup, Cleanup | Closed) => true,
            (Rejected, Pending | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Open => "OPEN",
            Self::Partial => "PARTIAL",
            Self::Escalated => "ESCALATED",
            Self::Cleanup => "CLEANUP",
            Self::Closed => "CLOSED",
            Self::Rejected => "REJECTED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Execution mode of a child order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderMode {
    /// Passive, post-only.
    Maker,
    /// Aggressive from the start.
    Taker,
    /// Escalated from maker to an immediate-or-cancel taker.
    Ioc,
}

impl fmt::Display for OrderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maker => write!(f, "maker"),
            Self::Taker => write!(f, "taker"),
            Self::Ioc => write!(f, "ioc"),
        }
    }
}

/// Exchange-originated reject reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    LotSize,
    MinNotional,
    PriceFilter,
    PostOnly,
    Stp,
    Unknown,
}

impl RejectReason {
    /// Map a venue reject string into the closed reason set.
    pub fn from_exchange(raw: &str) -> Self {
        let s = raw.to_ascii_uppercase();
        if s.contains("LOT_SIZE") || s.contains("LOT SIZE") {
            Self::LotSize
        } else if s.contains("MIN_NOTIONAL") || s.contains("MIN NOTIONAL") {
            Self::MinNotional
        } else if s.contains("PRICE_FILTER") || s.contains("TICK") {
            Self::PriceFilter
        } else if s.contains("POST_ONLY")
            || s.contains("POST ONLY")
            || s.contains("WOULD IMMEDIATELY MATCH")
        {
            Self::PostOnly
        } else if s.contains("STP") || s.contains("SELF TRADE") || s.contains("SELF-TRADE") {
            Self::Stp
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LotSize => "LOT_SIZE",
            Self::MinNotional => "MIN_NOTIONAL",
            Self::PriceFilter => "PRICE_FILTER",
            Self::PostOnly => "POST_ONLY",
            Self::Stp => "STP",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External trigger for cleaning up a decision's child orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    StopLoss,
    TtlSweep,
    GovernanceKill,
    NoProgress,
}

impl fmt::Display for CleanupTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StopLoss => "stop_loss",
            Self::TtlSweep => "ttl_sweep",
            Self::GovernanceKill => "governance_kill",
            Self::NoProgress => "no_progress",
        };
        f.write_str(s)
    }
}

/// One execution report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Venue trade id, when the venue supplies one.
    #[serde(default)]
    pub trade_id: Option<String>,
    pub ts_ms: u64,
    pub qty: Size,
    pub price: Price,
}

impl Fill {
    /// Deduplication key: trade id when present, else `(ts, qty, price)`.
    /// Decimals are normalized so `1.0` and `1` key the same fill.
    pub fn dedup_key(&self) -> String {
        match &self.trade_id {
            Some(id) => format!("t:{id}"),
            None => format!(
                "f:{}:{}:{}",
                self.ts_ms,
                self.qty.inner().normalize(),
                self.price.inner().normalize()
            ),
        }
    }
}

/// A child order owned by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildOrder {
    pub id: String,
    /// Parent intent id.
    pub correlation_id: String,
    pub group_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub target_qty: Size,
    pub filled_qty: Size,
    /// Limit price; `None` for taker children.
    pub price: Option<Price>,
    pub state: OrderState,
    pub mode: OrderMode,
    pub ttl_ms: u64,
    pub created_ms: u64,
    pub updated_ms: u64,
    pub fills: Vec<Fill>,
    pub reject_reason: Option<RejectReason>,
    pub retries: u32,
}

impl ChildOrder {
    /// Unfilled quantity, floored at zero.
    #[must_use]
    pub fn remaining(&self) -> Size {
        let rem = self.target_qty - self.filled_qty;
        if rem.is_positive() {
            rem
        } else {
            Size::ZERO
        }
    }

    #[must_use]
    pub fn is_fully_filled(&self) -> bool {
        self.filled_qty >= self.target_qty
    }

    /// Age since creation at `now_ms`.
    #[must_use]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_state_classification() {
        assert!(OrderState::Pending.is_active());
        assert!(OrderState::Open.is_active());
        assert!(OrderState::Partial.is_active());
        assert!(!OrderState::Escalated.is_active());

        assert!(OrderState::Closed.is_terminal());
        assert!(OrderState::Failed.is_terminal());
        assert!(!OrderState::Rejected.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(OrderState::Pending.can_transition(OrderState::Open));
        assert!(OrderState::Open.can_transition(OrderState::Partial));
        assert!(OrderState::Partial.can_transition(OrderState::Escalated));
        assert!(OrderState::Rejected.can_transition(OrderState::Pending));
        assert!(OrderState::Rejected.can_transition(OrderState::Failed));

        assert!(!OrderState::Closed.can_transition(OrderState::Open));
        assert!(!OrderState::Failed.can_transition(OrderState::Pending));
        assert!(!OrderState::Escalated.can_transition(OrderState::Open));
    }

    #[test]
    fn test_reject_reason_parsing() {
        assert_eq!(RejectReason::from_exchange("Filter failure: LOT_SIZE"), RejectReason::LotSize);
        assert_eq!(
            RejectReason::from_exchange("Filter failure: MIN_NOTIONAL"),
            RejectReason::MinNotional
        );
        assert_eq!(
            RejectReason::from_exchange("Filter failure: PRICE_FILTER"),
            RejectReason::PriceFilter
        );
        assert_eq!(
            RejectReason::from_exchange("Order would immediately match and take."),
            RejectReason::PostOnly
        );
        assert_eq!(RejectReason::from_exchange("self trade prevented"), RejectReason::Stp);
        assert_eq!(RejectReason::from_exchange("insufficient balance"), RejectReason::Unknown);
    }

    #[test]
    fn test_fill_dedup_key() {
        let with_id = Fill {
            trade_id: Some("T1".into()),
            ts_ms: 1,
            qty: Size::new(dec!(1)),
            price: Price::new(dec!(100)),
        };
        let without_id = Fill {
            trade_id: None,
            ..with_id.clone()
        };
        assert_eq!(with_id.dedup_key(), "t:T1");
        assert_eq!(without_id.dedup_key(), "f:1:1:100");
    }

    #[test]
    fn test_fill_dedup_key_ignores_decimal_scale() {
        let a = Fill {
            trade_id: None,
            ts_ms: 7,
            qty: Size::new(dec!(1)),
            price: Price::new(dec!(100)),
        };
        let b = Fill {
            qty: Size::new(dec!(1.000)),
            price: Price::new(dec!(100.00)),
            ..a.clone()
        };
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(b.dedup_key(), "f:7:1:100");
    }

    #[test]
    fn test_child_remaining_never_negative() {
        let child = ChildOrder {
            id: "c1".into(),
            correlation_id: "i1".into(),
            group_id: "g1".into(),
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            target_qty: Size::new(dec!(1)),
            filled_qty: Size::new(dec!(1.5)),
            price: None,
            state: OrderState::Closed,
            mode: OrderMode::Taker,
            ttl_ms: 1000,
            created_ms: 10,
            updated_ms: 20,
            fills: Vec::new(),
            reject_reason: None,
            retries: 0,
        };
        assert_eq!(child.remaining(), Size::ZERO);
        assert!(child.is_fully_filled());
        assert_eq!(child.age_ms(5), 0);
        assert_eq!(child.age_ms(1010), 1000);
    }
}
