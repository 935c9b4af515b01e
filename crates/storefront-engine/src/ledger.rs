//! # Coupon Ledger
//!
//! Owns coupon definitions and their usage counters.
//!
//! ```text
//!  validate(code, total)          redeem(code)
//!  ───────────────────            ────────────────────────────────
//!  read-only, any time            lock(code)
//!  rules from storefront-core       used_count < max_uses ?  +1 : refuse
//!  never touches used_count       unlock
//! ```
//!
//! Validation and redemption happen at different moments (cart time vs.
//! checkout time), so redemption re-checks capacity instead of trusting an
//! earlier validation.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use storefront_core::validation::validate_coupon_code;
use storefront_core::{Coupon, CouponRejection, CouponValidation, Money, NewCoupon};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::locks::KeyedLocks;
use crate::store::{CouponRepository, StoreError};

pub struct CouponLedger {
    coupons: Arc<dyn CouponRepository>,
    locks: KeyedLocks,
    clock: Arc<dyn Clock>,
}

impl CouponLedger {
    pub fn new(coupons: Arc<dyn CouponRepository>, clock: Arc<dyn Clock>, prune_threshold: usize) -> Self {
        CouponLedger {
            coupons,
            locks: KeyedLocks::new("coupon", prune_threshold),
            clock,
        }
    }

    /// Validates the definition and stores a fresh coupon with `used_count = 0`.
    pub async fn create(&self, new: NewCoupon) -> EngineResult<Coupon> {
        let new = new.validate()?;
        let coupon = Coupon::issue(new, Uuid::new_v4().to_string(), self.clock.now());

        match self.coupons.insert(&coupon).await {
            Ok(()) => {}
            Err(StoreError::Duplicate { .. }) => {
                return Err(EngineError::DuplicateCoupon { code: coupon.code });
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            code = %coupon.code,
            kind = ?coupon.discount.kind(),
            max_uses = coupon.max_uses,
            "Coupon created"
        );
        Ok(coupon)
    }

    /// Looks a coupon up by code (any case, surrounding spaces ignored).
    pub async fn find(&self, code: &str) -> EngineResult<Option<Coupon>> {
        let code = validate_coupon_code(code)?;
        Ok(self.coupons.get_by_code(&code).await?)
    }

    pub async fn get(&self, code: &str) -> EngineResult<Coupon> {
        self.find(code)
            .await?
            .ok_or_else(|| EngineError::CouponNotFound(code.trim().to_uppercase()))
    }

    /// Runs the full rule chain against `cart_total` at the current time.
    pub async fn validate(&self, code: &str, cart_total: Money) -> EngineResult<CouponValidation> {
        let coupon = self.find(code).await?;
        let result = CouponValidation::evaluate(coupon.as_ref(), cart_total, self.clock.now());

        debug!(
            code,
            total = cart_total.minor(),
            valid = result.valid,
            reason = ?result.reason,
            "Coupon validated"
        );
        Ok(result)
    }

    /// Consumes one use of `code`.
    ///
    /// ## Returns
    /// * `Ok(())` - one use consumed
    /// * `Err(CouponExhausted)` - no uses left at this moment
    /// * `Err(CouponRejected { reason: NotFound })` - deleted since validation
    pub async fn redeem(&self, code: &str) -> EngineResult<()> {
        let code = validate_coupon_code(code)?;
        let _guard = self.locks.lock(&code).await;

        match self.coupons.redeem(&code).await {
            Ok(true) => {
                info!(code = %code, "Coupon redeemed");
                Ok(())
            }
            Ok(false) => Err(EngineError::CouponExhausted { code }),
            Err(StoreError::NotFound { .. }) => {
                Err(EngineError::coupon(&code, CouponRejection::NotFound))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a coupon by id.
    ///
    /// Carts still pointing at the code drop it on their next recompute.
    pub async fn delete(&self, id: &str) -> EngineResult<Coupon> {
        match self.coupons.delete(id).await {
            Ok(coupon) => {
                info!(id, code = %coupon.code, "Coupon deleted");
                Ok(coupon)
            }
            Err(StoreError::NotFound { .. }) => Err(EngineError::CouponNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::clock::FixedClock;
    use chrono::{Duration, Utc};
    use storefront_core::CouponDiscount;

    fn new_coupon(code: &str, max_uses: i64) -> NewCoupon {
        let now = Utc::now();
        NewCoupon {
            code: code.to_string(),
            discount: CouponDiscount::Percentage { percent: 10 },
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            max_uses,
            active: true,
            minimum_purchase_minor: 500,
        }
    }

    fn ledger() -> (Arc<MemoryBackend>, Arc<FixedClock>, CouponLedger) {
        let backend = Arc::new(MemoryBackend::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let ledger = CouponLedger::new(backend.clone(), clock.clone(), 64);
        (backend, clock, ledger)
    }

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicates() {
        let (_, _, ledger) = ledger();
        let created = ledger.create(new_coupon("save10", 1)).await.unwrap();
        assert_eq!(created.code, "SAVE10");
        assert_eq!(created.used_count, 0);

        assert_eq!(
            ledger.create(new_coupon("SAVE10", 5)).await.unwrap_err(),
            EngineError::DuplicateCoupon {
                code: "SAVE10".into()
            }
        );
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_definition() {
        let (_, _, ledger) = ledger();
        let mut bad = new_coupon("BAD", 1);
        bad.valid_until = bad.valid_from - Duration::hours(1);

        assert_eq!(
            ledger.create(bad).await.unwrap_err().kind(),
            crate::error::ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn test_validate_does_not_consume() {
        let (backend, _, ledger) = ledger();
        ledger.create(new_coupon("SAVE10", 1)).await.unwrap();

        let result = ledger.validate(" save10", Money::from_minor(1000)).await.unwrap();
        assert!(result.valid);
        assert_eq!(result.discount_minor, 100);
        assert_eq!(backend.coupon_by_code("SAVE10").unwrap().used_count, 0);
    }

    #[tokio::test]
    async fn test_validate_unknown_and_expired() {
        let (_, clock, ledger) = ledger();
        ledger.create(new_coupon("SAVE10", 1)).await.unwrap();

        let unknown = ledger.validate("NOPE", Money::from_minor(1000)).await.unwrap();
        assert_eq!(unknown.reason, Some(CouponRejection::NotFound));

        clock.advance(Duration::days(3));
        let expired = ledger.validate("SAVE10", Money::from_minor(1000)).await.unwrap();
        assert!(matches!(expired.reason, Some(CouponRejection::Expired { .. })));
    }

    #[tokio::test]
    async fn test_redeem_until_exhausted() {
        let (backend, _, ledger) = ledger();
        ledger.create(new_coupon("TWICE", 2)).await.unwrap();

        ledger.redeem("twice").await.unwrap();
        ledger.redeem("TWICE").await.unwrap();
        assert_eq!(
            ledger.redeem("TWICE").await.unwrap_err(),
            EngineError::CouponExhausted {
                code: "TWICE".into()
            }
        );
        assert_eq!(backend.coupon_by_code("TWICE").unwrap().used_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_redeems_respect_max_uses() {
        let (backend, _, ledger) = ledger();
        ledger.create(new_coupon("LAST", 3)).await.unwrap();
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for _ in 0..12 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.redeem("LAST").await.is_ok() }));
        }

        let mut won = 0;
        for h in handles {
            if h.await.unwrap() {
                won += 1;
            }
        }

        assert_eq!(won, 3);
        assert_eq!(backend.coupon_by_code("LAST").unwrap().used_count, 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_, _, ledger) = ledger();
        let created = ledger.create(new_coupon("GONE", 1)).await.unwrap();

        ledger.delete(&created.id).await.unwrap();
        assert!(ledger.find("GONE").await.unwrap().is_none());
        assert!(matches!(
            ledger.delete(&created.id).await,
            Err(EngineError::CouponNotFound(_))
        ));
        assert!(matches!(
            ledger.redeem("GONE").await,
            Err(EngineError::CouponRejected {
                reason: CouponRejection::NotFound,
                ..
            })
        ));
    }
}
