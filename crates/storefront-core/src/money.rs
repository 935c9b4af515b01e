//! # Money Module
//!
//! Provides the `Money` type for monetary values in the store currency.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  OUR SOLUTION: integer minor units                                      │
//! │    price × quantity, Σ lines, discounts: all exact i64 arithmetic       │
//! │    Products and sums are checked; overflow is an error, never a wrap    │
//! │    Percentages are the only division, rounded half-up exactly once      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::money::Money;
//!
//! let price = Money::from_minor(500);
//! let line = price.checked_multiply_quantity(2).unwrap();
//! assert_eq!(line.minor(), 1000);
//!
//! // 10% of 1000, rounded half-up
//! assert_eq!(line.percentage(10).minor(), 100);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Where Money Flows
/// ```text
/// Product.price_minor ──► PricedLine.line_total ──► CartTotals.total
///                                                        │
///                    Coupon discount (clamped) ◄─────────┤
///                                                        ▼
///                                      CartTotals.total_with_discount
///                                                        │
///                                                        ▼
///                                             Purchase.total_paid_minor
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity. `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use storefront_core::money::Money;
    ///
    /// let unit_price = Money::from_minor(299);
    /// assert_eq!(unit_price.checked_multiply_quantity(3), Some(Money::from_minor(897)));
    /// assert_eq!(Money::from_minor(i64::MAX).checked_multiply_quantity(2), None);
    /// ```
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(minor) => Some(Money(minor)),
            None => None,
        }
    }

    /// Adds two amounts. `None` on overflow.
    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(minor) => Some(Money(minor)),
            None => None,
        }
    }

    /// Returns `percent`% of this amount, rounded half-up to the nearest
    /// minor unit.
    ///
    /// ## Rounding
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  ROUND HALF UP                                                      │
    /// │                                                                     │
    /// │  amount × percent / 100, with .5 always going up:                   │
    /// │    15% of 1003 = 150.45 → 150                                       │
    /// │    15% of 1010 = 151.50 → 152                                       │
    /// │                                                                     │
    /// │  Integer form: (amount × percent + 50) / 100                        │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// Negative amounts round half away from zero so the result mirrors the
    /// positive case.
    pub fn percentage(&self, percent: u8) -> Money {
        // i128 keeps large totals from overflowing before the division
        let scaled = self.0 as i128 * percent as i128;
        let rounded = if scaled >= 0 {
            (scaled + 50) / 100
        } else {
            (scaled - 50) / 100
        };
        Money(rounded as i64)
    }

    /// Returns the smaller of two values.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Clamps the value into `[Money::zero(), ceiling]`.
    ///
    /// Used to keep a discount from exceeding the amount it applies to.
    pub fn clamp_to(self, ceiling: Money) -> Money {
        if self.is_negative() {
            return Money::zero();
        }
        self.min(ceiling.max_zero())
    }

    /// Returns the value, or zero when it is negative.
    #[inline]
    pub fn max_zero(self) -> Money {
        if self.is_negative() {
            Money::zero()
        } else {
            self
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the raw minor-unit amount; formatting for display belongs to callers.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

/// Only applied to clamped values (`total - discount` with
/// `0 <= discount <= total`), which cannot overflow.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
