//! Precision-safe decimal types for sizing and pricing.
//!
//! Uses `rust_decimal` for exact decimal arithmetic. Rounding is always
//! explicit: quantities floor to the lot, buy prices floor to the tick,
//! sell prices ceil to the tick.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::str::FromStr;

/// Basis points per unit (1 = 10_000 bps).
pub const BPS_DIVISOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Decimal places kept when an `f64` crosses into decimal arithmetic.
const F64_IMPORT_DP: u32 = 12;

/// Convert a finite `f64` into a `Decimal`, rounded to 12 decimal places.
///
/// Returns `None` for NaN, infinities and magnitudes `Decimal` cannot hold.
pub fn f64_to_decimal(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_f64_retain(value).map(|d| d.round_dp(F64_IMPORT_DP))
}

macro_rules! decimal_newtype_ops {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $ty {
            type Err = rust_decimal::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<Decimal> for $ty {
            fn from(d: Decimal) -> Self {
                Self(d)
            }
        }

        impl Add for $ty {
            type Output = Self;

            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $ty {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Mul<Decimal> for $ty {
            type Output = Self;

            fn mul(self, rhs: Decimal) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<Decimal> for $ty {
            type Output = Self;

            fn div(self, rhs: Decimal) -> Self::Output {
                Self(self.0 / rhs)
            }
        }
    };
}

/// Price with exact decimal precision.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Round down to a multiple of `tick`. Used for buy prices.
    #[inline]
    pub fn floor_to_tick(&self, tick: Price) -> Self {
        if tick.0 <= Decimal::ZERO {
            return *self;
        }
        Self((self.0 / tick.0).floor() * tick.0)
    }

    /// Round up to a multiple of `tick`. Used for sell prices.
    #[inline]
    pub fn ceil_to_tick(&self, tick: Price) -> Self {
        if tick.0 <= Decimal::ZERO {
            return *self;
        }
        Self((self.0 / tick.0).ceil() * tick.0)
    }

    /// Round to the nearest multiple of `tick` (midpoint away from zero).
    #[inline]
    pub fn nearest_tick(&self, tick: Price) -> Self {
        if tick.0 <= Decimal::ZERO {
            return *self;
        }
        Self(
            (self.0 / tick.0).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                * tick.0,
        )
    }

    /// Whether the price sits exactly on the tick grid.
    #[inline]
    pub fn is_on_tick(&self, tick: Price) -> bool {
        tick.0 <= Decimal::ZERO || (self.0 % tick.0).is_zero()
    }

    /// Signed distance from `reference` in basis points.
    #[inline]
    pub fn bps_from(&self, reference: Price) -> Option<Decimal> {
        if reference.0.is_zero() {
            return None;
        }
        Some((self.0 - reference.0) / reference.0 * BPS_DIVISOR)
    }

    #[inline]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

decimal_newtype_ops!(Price);

/// Quantity with exact decimal precision.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Size(pub Decimal);

impl Size {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Round down to a multiple of `lot`. Negative quantities clamp to zero.
    #[inline]
    pub fn floor_to_lot(&self, lot: Size) -> Self {
        if self.0 <= Decimal::ZERO {
            return Self::ZERO;
        }
        if lot.0 <= Decimal::ZERO {
            return *self;
        }
        Self((self.0 / lot.0).floor() * lot.0)
    }

    /// Round up to a multiple of `lot`.
    #[inline]
    pub fn ceil_to_lot(&self, lot: Size) -> Self {
        if self.0 <= Decimal::ZERO {
            return Self::ZERO;
        }
        if lot.0 <= Decimal::ZERO {
            return *self;
        }
        Self((self.0 / lot.0).ceil() * lot.0)
    }

    /// Whether the quantity is an exact multiple of `lot`.
    #[inline]
    pub fn is_multiple_of(&self, lot: Size) -> bool {
        lot.0 <= Decimal::ZERO || (self.0 % lot.0).is_zero()
    }

    /// Notional value: quantity * price.
    #[inline]
    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.0
    }

    #[inline]
    pub fn min(self, other: Size) -> Size {
        if other.0 < self.0 {
            other
        } else {
            self
        }
    }
}

decimal_newtype_ops!(Size);
