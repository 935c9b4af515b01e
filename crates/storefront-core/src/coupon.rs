//! # Coupons
//!
//! Coupon definitions and the pure validation rules the coupon ledger runs.
//!
//! ## Validation Order (first failure wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate(code, cart_total, now)                                        │
//! │                                                                         │
//! │   1. exists?                       ── no ──► NotFound                   │
//! │   2. active?                       ── no ──► Inactive                   │
//! │   3. valid_from ≤ now ≤ valid_until── no ──► NotYetValid / Expired      │
//! │   4. used_count < max_uses?        ── no ──► Exhausted                  │
//! │   5. cart_total ≥ minimum_purchase?── no ──► BelowMinimumPurchase       │
//! │                                                                         │
//! │   ✓ discount = min(percentage or fixed amount, cart_total)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation never changes `used_count`. Redemption is a separate, atomic
//! step owned by the ledger and re-checks capacity at that moment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::{validate_coupon_code, ValidationResult};

// =============================================================================
// Discount Kind
// =============================================================================

/// Storage tag for [`CouponDiscount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    Percentage,
    Fixed,
}

/// How much a coupon takes off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CouponDiscount {
    /// 1–100 percent of the cart total.
    Percentage { percent: u8 },
    /// A flat amount in minor units.
    Fixed { amount_minor: i64 },
}

impl CouponDiscount {
    pub fn kind(&self) -> CouponKind {
        match self {
            CouponDiscount::Percentage { .. } => CouponKind::Percentage,
            CouponDiscount::Fixed { .. } => CouponKind::Fixed,
        }
    }

    /// Rebuilds a discount from its flattened storage columns.
    ///
    /// The value column matching `kind` is required; the other is ignored.
    pub fn from_parts(
        kind: CouponKind,
        percentage: Option<i64>,
        fixed_amount_minor: Option<i64>,
    ) -> ValidationResult<CouponDiscount> {
        let discount = match kind {
            CouponKind::Percentage => {
                let percent = percentage.ok_or_else(|| ValidationError::required("percentage"))?;
                if !(1..=100).contains(&percent) {
                    return Err(ValidationError::out_of_range("percentage", 1, 100));
                }
                CouponDiscount::Percentage {
                    percent: percent as u8,
                }
            }
            CouponKind::Fixed => {
                let amount_minor = fixed_amount_minor
                    .ok_or_else(|| ValidationError::required("fixed amount"))?;
                CouponDiscount::Fixed { amount_minor }
            }
        };
        discount.validate()?;
        Ok(discount)
    }

    fn validate(&self) -> ValidationResult<()> {
        match *self {
            CouponDiscount::Percentage { percent } if !(1..=100).contains(&percent) => {
                Err(ValidationError::out_of_range("percentage", 1, 100))
            }
            CouponDiscount::Fixed { amount_minor } if amount_minor < 0 => {
                Err(ValidationError::out_of_range("fixed amount", 0, i64::MAX))
            }
            _ => Ok(()),
        }
    }

    /// Percentage value, if this is a percentage discount.
    pub fn percentage(&self) -> Option<i64> {
        match self {
            CouponDiscount::Percentage { percent } => Some(i64::from(*percent)),
            CouponDiscount::Fixed { .. } => None,
        }
    }

    /// Fixed amount, if this is a fixed discount.
    pub fn fixed_amount_minor(&self) -> Option<i64> {
        match self {
            CouponDiscount::Percentage { .. } => None,
            CouponDiscount::Fixed { amount_minor } => Some(*amount_minor),
        }
    }

    /// Discount for a given total, never more than the total itself.
    pub fn amount_for(&self, total: Money) -> Money {
        let computed = match *self {
            CouponDiscount::Percentage { percent } => total.percentage(percent),
            CouponDiscount::Fixed { amount_minor } => Money::from_minor(amount_minor),
        };
        computed.clamp_to(total)
    }
}

// =============================================================================
// Rejection Reasons
// =============================================================================

/// Why a coupon cannot be used right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("coupon does not exist")]
    NotFound,

    #[error("coupon is not active")]
    Inactive,

    #[error("coupon is not valid until {starts_at}")]
    NotYetValid { starts_at: DateTime<Utc> },

    #[error("coupon expired at {ended_at}")]
    Expired { ended_at: DateTime<Utc> },

    #[error("coupon has no uses left")]
    Exhausted,

    #[error("cart total {total_minor} is below the coupon minimum of {minimum_minor}")]
    BelowMinimumPurchase { minimum_minor: i64, total_minor: i64 },
}

// =============================================================================
// Coupon
// =============================================================================

/// Input for creating a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCoupon {
    pub code: String,
    pub discount: CouponDiscount,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_uses: i64,
    pub active: bool,
    pub minimum_purchase_minor: i64,
}

impl NewCoupon {
    /// Validates every field and normalizes the code to upper case.
    ///
    /// ## Rules
    /// - code: non-empty, ≤ 32 chars, letters/digits/`-`/`_`
    /// - percentage 1–100, fixed amount ≥ 0
    /// - `valid_until` strictly after `valid_from`
    /// - `max_uses` ≥ 1, `minimum_purchase_minor` ≥ 0
    pub fn validate(mut self) -> ValidationResult<NewCoupon> {
        self.code = validate_coupon_code(&self.code)?;
        self.discount.validate()?;

        if self.valid_until <= self.valid_from {
            return Err(ValidationError::InvalidWindow {
                field: "coupon validity".to_string(),
            });
        }

        if self.max_uses < 1 {
            return Err(ValidationError::out_of_range("max uses", 1, i64::MAX));
        }

        if self.minimum_purchase_minor < 0 {
            return Err(ValidationError::out_of_range("minimum purchase", 0, i64::MAX));
        }

        Ok(self)
    }
}

/// A coupon with its usage counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: String,
    /// Unique, upper case.
    pub code: String,
    pub discount: CouponDiscount,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub max_uses: i64,
    /// Only ever incremented, and only by checkout redemption.
    pub used_count: i64,
    pub active: bool,
    pub minimum_purchase_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Builds a fresh coupon from validated input.
    pub fn issue(new: NewCoupon, id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Coupon {
            id: id.into(),
            code: new.code,
            discount: new.discount,
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            max_uses: new.max_uses,
            used_count: 0,
            active: new.active,
            minimum_purchase_minor: new.minimum_purchase_minor,
            created_at: now,
        }
    }

    pub fn remaining_uses(&self) -> i64 {
        (self.max_uses - self.used_count).max(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used_count >= self.max_uses
    }

    /// Runs rules 2–5 for an existing coupon and returns the discount.
    pub fn evaluate(&self, cart_total: Money, now: DateTime<Utc>) -> Result<Money, CouponRejection> {
        if !self.active {
            return Err(CouponRejection::Inactive);
        }
        if now < self.valid_from {
            return Err(CouponRejection::NotYetValid {
                starts_at: self.valid_from,
            });
        }
        if now > self.valid_until {
            return Err(CouponRejection::Expired {
                ended_at: self.valid_until,
            });
        }
        if self.is_exhausted() {
            return Err(CouponRejection::Exhausted);
        }
        if cart_total.minor() < self.minimum_purchase_minor {
            return Err(CouponRejection::BelowMinimumPurchase {
                minimum_minor: self.minimum_purchase_minor,
                total_minor: cart_total.minor(),
            });
        }

        Ok(self.discount.amount_for(cart_total))
    }
}

// =============================================================================
// Validation Result
// =============================================================================

/// Outcome of validating a coupon against a cart total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponValidation {
    pub valid: bool,
    pub reason: Option<CouponRejection>,
    pub discount_minor: i64,
}

impl CouponValidation {
    /// Runs the full rule chain, including the existence check.
    pub fn evaluate(coupon: Option<&Coupon>, cart_total: Money, now: DateTime<Utc>) -> Self {
        let outcome = match coupon {
            Some(coupon) => coupon.evaluate(cart_total, now),
            None => Err(CouponRejection::NotFound),
        };

        match outcome {
            Ok(discount) => CouponValidation {
                valid: true,
                reason: None,
                discount_minor: discount.minor(),
            },
            Err(reason) => CouponValidation {
                valid: false,
                reason: Some(reason),
                discount_minor: 0,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
