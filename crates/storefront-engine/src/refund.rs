//! Refund requests against committed purchases.
//!
//! Only the status moves: `pending → approved | rejected`. Stock and coupon
//! usage are never touched here.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use storefront_core::validation::{validate_id, validate_refund_reason};
use storefront_core::{CoreError, Refund, RefundStatus};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::store::{PurchaseRepository, RefundRepository, StoreError};

pub struct RefundDesk {
    refunds: Arc<dyn RefundRepository>,
    purchases: Arc<dyn PurchaseRepository>,
    clock: Arc<dyn Clock>,
}

impl RefundDesk {
    pub fn new(
        refunds: Arc<dyn RefundRepository>,
        purchases: Arc<dyn PurchaseRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        RefundDesk {
            refunds,
            purchases,
            clock,
        }
    }

    /// Opens a pending refund for an existing purchase.
    pub async fn request(&self, purchase_id: &str, reason: &str) -> EngineResult<Refund> {
        let purchase_id = validate_id("purchase id", purchase_id)?;
        let reason = validate_refund_reason(reason)?;

        if self.purchases.get(&purchase_id).await?.is_none() {
            return Err(EngineError::PurchaseNotFound(purchase_id));
        }

        let refund = Refund {
            id: Uuid::new_v4().to_string(),
            purchase_id,
            reason,
            status: RefundStatus::Pending,
            requested_at: self.clock.now(),
            resolved_at: None,
        };
        self.refunds.insert(&refund).await?;

        info!(refund_id = %refund.id, purchase_id = %refund.purchase_id, "Refund requested");
        Ok(refund)
    }

    /// Approves or rejects a pending refund.
    pub async fn resolve(&self, refund_id: &str, status: RefundStatus) -> EngineResult<Refund> {
        let refund_id = validate_id("refund id", refund_id)?;
        let mut refund = self.get(&refund_id).await?;
        refund.status.transition(status)?;

        let now = self.clock.now();
        match self.refunds.resolve(&refund_id, status, now).await {
            Ok(true) => {}
            // Resolved by someone else since the read above
            Ok(false) => {
                let current = self.get(&refund_id).await?;
                return Err(CoreError::IllegalRefundTransition {
                    from: current.status,
                    to: status,
                }
                .into());
            }
            Err(StoreError::NotFound { .. }) => return Err(EngineError::RefundNotFound(refund_id)),
            Err(e) => return Err(e.into()),
        }

        refund.status = status;
        refund.resolved_at = Some(now);
        info!(refund_id = %refund.id, status = ?status, "Refund resolved");
        Ok(refund)
    }

    pub async fn get(&self, refund_id: &str) -> EngineResult<Refund> {
        self.refunds
            .get(refund_id)
            .await?
            .ok_or_else(|| EngineError::RefundNotFound(refund_id.to_string()))
    }

    /// Every refund, newest first.
    pub async fn list(&self) -> EngineResult<Vec<Refund>> {
        Ok(self.refunds.list().await?)
    }
}
