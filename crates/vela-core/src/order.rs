//! Order side, type, time-in-force and deterministic group identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    #[serde(alias = "buy", alias = "Buy")]
    Buy,
    #[serde(alias = "sell", alias = "Sell")]
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Returns 1 for buy, -1 for sell.
    pub fn sign(&self) -> i8 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Self::Buy)
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type sent to the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Resting limit order (maker, post-only).
    LimitPostOnly,
    /// Aggressive order crossing the spread (taker).
    Market,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LimitPostOnly => write!(f, "limit_post_only"),
            Self::Market => write!(f, "market"),
        }
    }
}

/// Time-in-force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good-til-cancelled.
    #[default]
    Gtc,
    /// Immediate-or-cancel.
    Ioc,
    /// Fill-or-kill.
    Fok,
}

impl TimeInForce {
    /// IOC/FOK orders can never rest, so a taker fallback is the only path
    /// they allow; when post-only is also requested there is no valid route.
    pub fn forbids_resting(&self) -> bool {
        matches!(self, Self::Ioc | Self::Fok)
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gtc => write!(f, "GTC"),
            Self::Ioc => write!(f, "IOC"),
            Self::Fok => write!(f, "FOK"),
        }
    }
}

/// Namespace for decision group ids (UUID v5 over intent id, symbol, timestamp).
const GROUP_NAMESPACE: Uuid = Uuid::from_u128(0x5f1e_3a7c_9b20_4d8e_a6c1_0e7f_42b9_d315);

/// Deterministic group / client id for a decision.
///
/// The same `(intent_id, symbol, ts_ms)` always yields the same id, so a
/// replayed decision correlates with the original audit trail.
pub fn group_id(intent_id: &str, symbol: &str, ts_ms: u64) -> String {
    let name = format!("{intent_id}|{symbol}|{ts_ms}");
    let uuid = Uuid::new_v5(&GROUP_NAMESPACE, name.as_bytes());
    format!("vela_{}", uuid.simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn test_order_side_sign() {
        assert_eq!(OrderSide::Buy.sign(), 1);
        assert_eq!(OrderSide::Sell.sign(), -1);
    }

    #[test]
    fn test_order_side_serde_aliases() {
        let side: OrderSide = serde_json::from_str("\"buy\"").unwrap();
        assert_eq!(side, OrderSide::Buy);
        let side: OrderSide = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(side, OrderSide::Sell);
        assert!(serde_json::from_str::<OrderSide>("\"hold\"").is_err());
    }

    #[test]
    fn test_tif_forbids_resting() {
        assert!(!TimeInForce::Gtc.forbids_resting());
        assert!(TimeInForce::Ioc.forbids_resting());
        assert!(TimeInForce::Fok.forbids_resting());
    }

    #[test]
    fn test_group_id_deterministic() {
        let a = group_id("intent-1", "BTCUSDT", 1_700_000_000_000);
        let b = group_id("intent-1", "BTCUSDT", 1_700_000_000_000);
        let c = group_id("intent-1", "BTCUSDT", 1_700_000_000_001);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("vela_"));
    }
}
