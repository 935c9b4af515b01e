//! # Purchase Repository
//!
//! Append-only purchase records. There is no update or delete.
//!
//! Lines are frozen into a JSON column at insert time: a purchase must keep
//! describing what was sold even after the catalog changes.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use storefront_core::{Purchase, PurchaseLine};

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: String,
    client_id: String,
    items: String,
    total_minor: i64,
    discount_minor: i64,
    coupon_code: Option<String>,
    total_paid_minor: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<PurchaseRow> for Purchase {
    type Error = DbError;

    fn try_from(row: PurchaseRow) -> Result<Self, Self::Error> {
        let items: Vec<PurchaseLine> =
            serde_json::from_str(&row.items).map_err(|e| DbError::corrupt("Purchase", e))?;

        Ok(Purchase {
            id: row.id,
            client_id: row.client_id,
            items,
            total_minor: row.total_minor,
            discount_minor: row.discount_minor,
            coupon_code: row.coupon_code,
            total_paid_minor: row.total_paid_minor,
            created_at: row.created_at,
        })
    }
}

const SELECT_PURCHASE: &str = r#"
    SELECT id, client_id, items, total_minor, discount_minor, coupon_code,
           total_paid_minor, created_at
    FROM purchases
"#;

#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Appends a purchase.
    pub async fn insert(&self, purchase: &Purchase) -> DbResult<()> {
        debug!(
            id = %purchase.id,
            client_id = %purchase.client_id,
            total_paid = purchase.total_paid_minor,
            "Inserting purchase"
        );

        let items =
            serde_json::to_string(&purchase.items).map_err(|e| DbError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, client_id, items, total_minor, discount_minor,
                coupon_code, total_paid_minor, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.client_id)
        .bind(items)
        .bind(purchase.total_minor)
        .bind(purchase.discount_minor)
        .bind(&purchase.coupon_code)
        .bind(purchase.total_paid_minor)
        .bind(purchase.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Purchase>> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!("{SELECT_PURCHASE} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Purchase::try_from).transpose()
    }

    /// A client's purchases, newest first.
    pub async fn list_for_client(&self, client_id: &str) -> DbResult<Vec<Purchase>> {
        sqlx::query_as::<_, PurchaseRow>(&format!(
            "{SELECT_PURCHASE} WHERE client_id = ?1 ORDER BY created_at DESC"
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Purchase::try_from)
        .collect()
    }

    /// Purchases with `from <= created_at < to`, oldest first.
    pub async fn list_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<Purchase>> {
        sqlx::query_as::<_, PurchaseRow>(&format!(
            "{SELECT_PURCHASE} WHERE created_at >= ?1 AND created_at < ?2 ORDER BY created_at ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Purchase::try_from)
        .collect()
    }
}

/// Generates a purchase id.
pub fn generate_purchase_id() -> String {
    Uuid::new_v4().to_string()
}
