//! Market snapshot consumed by one decision.
//!
//! A `MarketSpec` is refreshed every decision cycle and never retained
//! beyond it. It carries the venue filters (tick, lot, minimum notional),
//! the fee schedule and the top of book.

use crate::error::{CoreError, Result};
use crate::{Price, Size, BPS_DIVISOR};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market specification and top-of-book snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSpec {
    /// Instrument symbol (e.g., "BTCUSDT").
    pub symbol: String,

    /// Minimum price increment.
    pub tick_size: Price,

    /// Minimum quantity increment.
    pub lot_size: Size,

    /// Minimum order notional in quote currency.
    pub min_notional: Decimal,

    /// Maker fee in basis points (negative = venue rebate).
    pub maker_fee_bps: Decimal,

    /// Taker fee in basis points.
    pub taker_fee_bps: Decimal,

    /// Best bid price.
    pub best_bid: Price,

    /// Best ask price.
    pub best_ask: Price,

    /// Quoted spread in basis points of mid.
    pub spread_bps: Decimal,

    /// Mid price.
    pub mid: Price,
}

impl MarketSpec {
    /// Build a snapshot from top of book, deriving mid and spread.
    #[allow(clippy::too_many_arguments)]
    pub fn from_quotes(
        symbol: impl Into<String>,
        tick_size: Price,
        lot_size: Size,
        min_notional: Decimal,
        maker_fee_bps: Decimal,
        taker_fee_bps: Decimal,
        best_bid: Price,
        best_ask: Price,
    ) -> Self {
        let mid = Price::new((best_bid.inner() + best_ask.inner()) / Decimal::TWO);
        let spread_bps = if mid.is_positive() {
            (best_ask.inner() - best_bid.inner()) / mid.inner() * BPS_DIVISOR
        } else {
            Decimal::ZERO
        };
        Self {
            symbol: symbol.into(),
            tick_size,
            lot_size,
            min_notional,
            maker_fee_bps,
            taker_fee_bps,
            best_bid,
            best_ask,
            spread_bps,
            mid,
        }
    }

    /// Half of the quoted spread, in basis points.
    pub fn half_spread_bps(&self) -> Decimal {
        self.spread_bps / Decimal::TWO
    }

    /// Reject snapshots no decision can be priced against.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            return Err(CoreError::InvalidMarket("empty symbol".to_string()));
        }
        if !self.tick_size.is_positive() {
            return Err(CoreError::InvalidPrice(format!(
                "tick_size must be positive, got {}",
                self.tick_size
            )));
        }
        if !self.lot_size.is_positive() {
            return Err(CoreError::InvalidSize(format!(
                "lot_size must be positive, got {}",
                self.lot_size
            )));
        }
        if !self.mid.is_positive() || !self.best_bid.is_positive() || !self.best_ask.is_positive()
        {
            return Err(CoreError::InvalidPrice(format!(
                "non-positive quote: bid={} ask={} mid={}",
                self.best_bid, self.best_ask, self.mid
            )));
        }
        if self.best_bid > self.best_ask {
            return Err(CoreError::InvalidMarket(format!(
                "crossed book: bid={} > ask={}",
                self.best_bid, self.best_ask
            )));
        }
        if self.spread_bps < Decimal::ZERO || self.min_notional < Decimal::ZERO {
            return Err(CoreError::InvalidMarket(
                "negative spread or min_notional".to_string(),
            ));
        }
        if self.taker_fee_bps < Decimal::ZERO {
            return Err(CoreError::InvalidMarket(format!(
                "negative taker fee {}",
                self.taker_fee_bps
            )));
        }
        Ok(())
    }
}
