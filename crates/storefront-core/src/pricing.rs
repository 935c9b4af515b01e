//! # Cart Pricing
//!
//! Turns priced cart lines and an optional coupon into cart totals.
//!
//! ```text
//! lines ──► Σ unit_price × quantity ──► total
//!                                        │
//!      coupon? ── evaluate(total, now) ──┤
//!                                        ▼
//!              discount = clamp(discount, 0..=total)
//!              total_with_discount = total − discount
//! ```
//!
//! Unit prices are whatever the catalog reports at the moment of pricing;
//! a cart stores quantities, never prices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coupon::{Coupon, CouponRejection};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::PurchaseLine;

/// A cart line joined with its current unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl PricedLine {
    /// `AmountOverflow` when price × quantity does not fit.
    pub fn line_total(&self) -> CoreResult<Money> {
        self.unit_price
            .checked_multiply_quantity(self.quantity)
            .ok_or(CoreError::AmountOverflow)
    }

    /// Freezes this line for a purchase record.
    pub fn to_purchase_line(&self) -> PurchaseLine {
        PurchaseLine {
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            unit_price_minor: self.unit_price.minor(),
        }
    }
}

/// Computed cart totals.
///
/// Construction always clamps the discount into `[0, total]`, so
/// `total_with_discount` can never be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub total: Money,
    pub discount: Money,
    pub total_with_discount: Money,
}

impl CartTotals {
    pub fn new(total: Money, discount: Money) -> Self {
        let total = total.max_zero();
        let discount = discount.clamp_to(total);
        CartTotals {
            total,
            discount,
            total_with_discount: total - discount,
        }
    }

    pub fn without_discount(total: Money) -> Self {
        CartTotals::new(total, Money::zero())
    }
}

/// Sum of all line totals. `AmountOverflow` if any step overflows.
pub fn subtotal(lines: &[PricedLine]) -> CoreResult<Money> {
    lines.iter().try_fold(Money::zero(), |acc, line| {
        acc.checked_add(line.line_total()?)
            .ok_or(CoreError::AmountOverflow)
    })
}

/// What happened to the coupon during pricing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponOutcome {
    /// No coupon attached.
    NotApplied,
    /// Coupon passed every rule; carries the discount.
    Applied(Money),
    /// Coupon failed a rule.
    Rejected(CouponRejection),
}

/// Totals plus the coupon verdict that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartQuote {
    pub totals: CartTotals,
    pub coupon: CouponOutcome,
}

/// Prices a cart.
///
/// A rejected coupon contributes no discount; callers decide whether that
/// means detaching it or failing the operation.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use storefront_core::money::Money;
/// use storefront_core::pricing::{quote, CouponOutcome, PricedLine};
///
/// let lines = vec![PricedLine {
///     product_id: "sku-1".to_string(),
///     quantity: 2,
///     unit_price: Money::from_minor(500),
/// }];
///
/// let q = quote(&lines, None, Utc::now()).unwrap();
/// assert_eq!(q.totals.total.minor(), 1000);
/// assert_eq!(q.coupon, CouponOutcome::NotApplied);
/// ```
pub fn quote(
    lines: &[PricedLine],
    coupon: Option<&Coupon>,
    now: DateTime<Utc>,
) -> CoreResult<CartQuote> {
    let total = subtotal(lines)?;

    let Some(coupon) = coupon else {
        return Ok(CartQuote {
            totals: CartTotals::without_discount(total),
            coupon: CouponOutcome::NotApplied,
        });
    };

    let quote = match coupon.evaluate(total, now) {
        Ok(discount) => CartQuote {
            totals: CartTotals::new(total, discount),
            coupon: CouponOutcome::Applied(discount),
        },
        Err(reason) => CartQuote {
            totals: CartTotals::without_discount(total),
            coupon: CouponOutcome::Rejected(reason),
        },
    };
    Ok(quote)
}
