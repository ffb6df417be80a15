//! Reason-specific reject backoff.
//!
//! Each venue reject reason maps to one adjustment of the child before it
//! is re-queued:
//!
//! - `LOT_SIZE`: shrink target 10%, floored to the venue lot
//! - `MIN_NOTIONAL`: shrink target 20%, floored to the venue lot
//! - `POST_ONLY`: move the limit one tick away from the crossed side
//! - `PRICE_FILTER`: snap the limit to the nearest valid tick
//! - `STP` / `UNKNOWN`: no retry

use rust_decimal::Decimal;
use vela_core::{ChildOrder, OrderSide, Price, RejectReason, Size};

/// Outcome of applying a backoff step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    /// Re-queue with the adjusted quantity and price.
    Retry {
        target_qty: Size,
        price: Option<Price>,
    },
    /// Give up; the child fails permanently.
    Exhausted,
}

/// Compute the retry parameters for `order` after a `reason` reject.
///
/// Shrunk quantities stay on the `lot` grid; below `min_lot` the child is
/// exhausted.
pub fn apply(
    reason: RejectReason,
    order: &ChildOrder,
    tick: Price,
    lot: Size,
    min_lot: Size,
) -> Backoff {
    match reason {
        RejectReason::LotSize => shrink(order, Decimal::new(9, 1), lot, min_lot),
        RejectReason::MinNotional => shrink(order, Decimal::new(8, 1), lot, min_lot),
        RejectReason::PostOnly => match order.price {
            Some(price) => {
                let repriced = match order.side {
                    OrderSide::Buy => price - tick,
                    OrderSide::Sell => price + tick,
                };
                if !repriced.is_positive() {
                    return Backoff::Exhausted;
                }
                Backoff::Retry {
                    target_qty: order.target_qty,
                    price: Some(repriced),
                }
            }
            None => Backoff::Retry {
                target_qty: order.target_qty,
                price: None,
            },
        },
        RejectReason::PriceFilter => Backoff::Retry {
            target_qty: order.target_qty,
            price: order.price.map(|p| p.nearest_tick(tick)),
        },
        RejectReason::Stp | RejectReason::Unknown => Backoff::Exhausted,
    }
}

fn shrink(order: &ChildOrder, factor: Decimal, lot: Size, min_lot: Size) -> Backoff {
    let shrunk = (order.target_qty * factor).floor_to_lot(lot);
    if shrunk < min_lot || !shrunk.is_positive() {
        return Backoff::Exhausted;
    }
    Backoff::Retry {
        target_qty: shrunk,
        price: order.price,
    }
}
