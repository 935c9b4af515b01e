//! # Coupon Repository
//!
//! Coupon definitions and the usage counter.
//!
//! ## Redemption
//! ```text
//! UPDATE coupons SET used_count = used_count + 1
//! WHERE code = ? AND used_count < max_uses
//!
//!   1 row  → redeemed
//!   0 rows → exhausted (or unknown code, checked separately)
//! ```
//!
//! The capacity check lives in the same statement as the increment, so two
//! checkouts racing for the last use can never both win.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use storefront_core::{Coupon, CouponDiscount, CouponKind};

/// Flat row shape; the discount is split across `kind` and two value columns.
#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: String,
    code: String,
    kind: CouponKind,
    percentage: Option<i64>,
    fixed_amount_minor: Option<i64>,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
    max_uses: i64,
    used_count: i64,
    active: bool,
    minimum_purchase_minor: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = DbError;

    fn try_from(row: CouponRow) -> Result<Self, Self::Error> {
        let discount = CouponDiscount::from_parts(row.kind, row.percentage, row.fixed_amount_minor)
            .map_err(|e| DbError::corrupt("Coupon", e))?;

        Ok(Coupon {
            id: row.id,
            code: row.code,
            discount,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            max_uses: row.max_uses,
            used_count: row.used_count,
            active: row.active,
            minimum_purchase_minor: row.minimum_purchase_minor,
            created_at: row.created_at,
        })
    }
}

const SELECT_COUPON: &str = r#"
    SELECT id, code, kind, percentage, fixed_amount_minor, valid_from, valid_until,
           max_uses, used_count, active, minimum_purchase_minor, created_at
    FROM coupons
"#;

#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Inserts a coupon.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - code already in use
    pub async fn insert(&self, coupon: &Coupon) -> DbResult<()> {
        debug!(code = %coupon.code, "Inserting coupon");

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, kind, percentage, fixed_amount_minor,
                valid_from, valid_until, max_uses, used_count, active,
                minimum_purchase_minor, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&coupon.id)
        .bind(&coupon.code)
        .bind(coupon.discount.kind())
        .bind(coupon.discount.percentage())
        .bind(coupon.discount.fixed_amount_minor())
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.max_uses)
        .bind(coupon.used_count)
        .bind(coupon.active)
        .bind(coupon.minimum_purchase_minor)
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &coupon.code),
            other => other,
        })?;

        Ok(())
    }

    /// Looks a coupon up by its (already normalized) code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!("{SELECT_COUPON} WHERE code = ?1"))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Coupon::try_from).transpose()
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!("{SELECT_COUPON} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Coupon::try_from).transpose()
    }

    /// Lists every coupon, newest first.
    pub async fn list(&self) -> DbResult<Vec<Coupon>> {
        sqlx::query_as::<_, CouponRow>(&format!("{SELECT_COUPON} ORDER BY created_at DESC"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Coupon::try_from)
            .collect()
    }

    /// Deletes a coupon by id and returns the deleted coupon.
    pub async fn delete(&self, id: &str) -> DbResult<Coupon> {
        debug!(id = %id, "Deleting coupon");

        let row = sqlx::query_as::<_, CouponRow>(
            r#"
            DELETE FROM coupons
            WHERE id = ?1
            RETURNING id, code, kind, percentage, fixed_amount_minor, valid_from, valid_until,
                      max_uses, used_count, active, minimum_purchase_minor, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Coupon::try_from(row),
            None => Err(DbError::not_found("Coupon", id)),
        }
    }

    /// Consumes one use if any remain.
    ///
    /// ## Returns
    /// * `Ok(true)` - used_count was incremented
    /// * `Ok(false)` - no uses left
    /// * `Err(DbError::NotFound)` - unknown code
    pub async fn redeem(&self, code: &str) -> DbResult<bool> {
        debug!(code = %code, "Redeeming coupon");

        let used: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE coupons
            SET used_count = used_count + 1
            WHERE code = ?1 AND used_count < max_uses
            RETURNING used_count
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        if used.is_some() {
            return Ok(true);
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM coupons WHERE code = ?1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Ok(false),
            None => Err(DbError::not_found("Coupon", code)),
        }
    }
}
