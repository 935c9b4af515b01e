//! # Refund Repository
//!
//! Refund requests and their single `pending → approved | rejected` step.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use storefront_core::{Refund, RefundStatus};

const SELECT_REFUND: &str = r#"
    SELECT id, purchase_id, reason, status, requested_at, resolved_at
    FROM refunds
"#;

#[derive(Debug, Clone)]
pub struct RefundRepository {
    pool: SqlitePool,
}

impl RefundRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RefundRepository { pool }
    }

    /// Stores a new request.
    ///
    /// ## Returns
    /// * `Err(DbError::ForeignKeyViolation)` - the purchase does not exist
    pub async fn insert(&self, refund: &Refund) -> DbResult<()> {
        debug!(id = %refund.id, purchase_id = %refund.purchase_id, "Inserting refund");

        sqlx::query(
            r#"
            INSERT INTO refunds (id, purchase_id, reason, status, requested_at, resolved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&refund.id)
        .bind(&refund.purchase_id)
        .bind(&refund.reason)
        .bind(refund.status)
        .bind(refund.requested_at)
        .bind(refund.resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Refund>> {
        let refund = sqlx::query_as::<_, Refund>(&format!("{SELECT_REFUND} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(refund)
    }

    /// Every refund request, newest first.
    pub async fn list(&self) -> DbResult<Vec<Refund>> {
        let refunds =
            sqlx::query_as::<_, Refund>(&format!("{SELECT_REFUND} ORDER BY requested_at DESC"))
                .fetch_all(&self.pool)
                .await?;

        Ok(refunds)
    }

    /// Moves a pending refund to its final status.
    ///
    /// ## Returns
    /// * `Ok(true)` - the refund was pending and is now resolved
    /// * `Ok(false)` - it had already been resolved
    /// * `Err(DbError::NotFound)` - unknown refund id
    pub async fn resolve(
        &self,
        id: &str,
        status: RefundStatus,
        resolved_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(id = %id, status = ?status, "Resolving refund");

        let result = sqlx::query(
            r#"
            UPDATE refunds
            SET status = ?2, resolved_at = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(resolved_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        match self.get_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(DbError::not_found("Refund", id)),
        }
    }
}

/// Generates a refund id.
pub fn generate_refund_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::purchase::generate_purchase_id;
    use crate::{Database, DbConfig};
    use storefront_core::Purchase;

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let purchase = Purchase {
            id: generate_purchase_id(),
            client_id: "c1".to_string(),
            items: vec![],
            total_minor: 0,
            discount_minor: 0,
            coupon_code: None,
            total_paid_minor: 0,
            created_at: Utc::now(),
        };
        db.purchases().insert(&purchase).await.unwrap();
        (db, purchase.id)
    }

    fn refund(purchase_id: &str) -> Refund {
        Refund {
            id: generate_refund_id(),
            purchase_id: purchase_id.to_string(),
            reason: "arrived broken".to_string(),
            status: RefundStatus::Pending,
            requested_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_resolve_once() {
        let (db, purchase_id) = setup().await;
        let r = refund(&purchase_id);
        db.refunds().insert(&r).await.unwrap();

        assert!(db
            .refunds()
            .resolve(&r.id, RefundStatus::Approved, Utc::now())
            .await
            .unwrap());
        assert!(!db
            .refunds()
            .resolve(&r.id, RefundStatus::Rejected, Utc::now())
            .await
            .unwrap());

        let loaded = db.refunds().get_by_id(&r.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RefundStatus::Approved);
        assert!(loaded.resolved_at.is_some());
        assert_eq!(db.refunds().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refund_for_unknown_purchase_rejected() {
        let (db, _) = setup().await;
        let err = db.refunds().insert(&refund("missing")).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }

    #[tokio::test]
    async fn test_resolve_unknown_refund() {
        let (db, _) = setup().await;
        assert!(matches!(
            db.refunds()
                .resolve("nope", RefundStatus::Approved, Utc::now())
                .await,
            Err(DbError::NotFound { .. })
        ));
    }
}
