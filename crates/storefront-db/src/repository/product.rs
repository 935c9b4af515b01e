//! # Product Repository
//!
//! Catalog rows and the guarded stock counter.
//!
//! ## Stock Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Stock Update Strategy                            │
//! │                                                                     │
//! │  ❌ WRONG: read, compute, write back an absolute value              │
//! │     SELECT stock ...; UPDATE products SET stock = 7                 │
//! │     (a concurrent writer's change is lost)                          │
//! │                                                                     │
//! │  ✅ CORRECT: one conditional delta update                           │
//! │     UPDATE products SET stock = stock + ?delta                      │
//! │     WHERE id = ? AND stock + ?delta >= 0                            │
//! │     RETURNING stock                                                 │
//! │                                                                     │
//! │  The check and the write are a single statement, so stock can never │
//! │  go negative even with writers outside this process.                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use storefront_core::Product;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price_minor, stock, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists products ordered by name.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, price_minor, stock, created_at, updated_at
            FROM products
            ORDER BY name
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - ID already exists
    /// * `Err(DbError::ConstraintViolation)` - negative price or stock
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_minor, stock, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_minor)
        .bind(product.stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &product.id),
            other => other,
        })?;

        Ok(product.clone())
    }

    /// Changes the unit price. Carts pick it up on their next recompute.
    pub async fn update_price(&self, id: &str, price_minor: i64) -> DbResult<()> {
        debug!(id = %id, price_minor, "Updating price");

        let result = sqlx::query(
            r#"
            UPDATE products
            SET price_minor = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(price_minor)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Applies a stock delta and returns the new stock level.
    ///
    /// ## Arguments
    /// * `id` - Product ID
    /// * `delta` - Negative to consume, positive to release or restock
    ///
    /// ## Returns
    /// * `Ok(stock)` - The stock after the update
    /// * `Err(DbError::NotFound)` - No such product
    /// * `Err(DbError::ConstraintViolation)` - The delta would make stock negative
    pub async fn update_stock(&self, id: &str, delta: i64) -> DbResult<i64> {
        debug!(id = %id, delta, "Updating stock");

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock + ?2, updated_at = ?3
            WHERE id = ?1 AND stock + ?2 >= 0
            RETURNING stock
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(stock) = updated {
            return Ok(stock);
        }

        // Nothing matched: either the product is missing or the guard failed
        match self.get_by_id(id).await? {
            None => Err(DbError::not_found("Product", id)),
            Some(product) => Err(DbError::ConstraintViolation {
                message: format!(
                    "stock for {} would go negative ({} {:+})",
                    id, product.stock, delta
                ),
            }),
        }
    }

    /// Counts products (for diagnostics and the seed binary).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn product(id: &str, price: i64, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: format!("Product {}", id),
            price_minor: price,
            stock,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup() -> ProductRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().products()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = setup().await;
        repo.insert(&product("p1", 500, 10)).await.unwrap();

        let found = repo.get_by_id("p1").await.unwrap().unwrap();
        assert_eq!(found.price_minor, 500);
        assert_eq!(found.stock, 10);
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let repo = setup().await;
        repo.insert(&product("p1", 500, 10)).await.unwrap();

        let err = repo.insert(&product("p1", 100, 1)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_update_stock_returns_new_level() {
        let repo = setup().await;
        repo.insert(&product("p1", 500, 10)).await.unwrap();

        assert_eq!(repo.update_stock("p1", -2).await.unwrap(), 8);
        assert_eq!(repo.update_stock("p1", 2).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_update_stock_never_goes_negative() {
        let repo = setup().await;
        repo.insert(&product("p1", 500, 1)).await.unwrap();

        let err = repo.update_stock("p1", -2).await.unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation { .. }));
        assert_eq!(repo.get_by_id("p1").await.unwrap().unwrap().stock, 1);

        assert_eq!(repo.update_stock("p1", -1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_stock_missing_product() {
        let repo = setup().await;
        let err = repo.update_stock("nope", 1).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_price() {
        let repo = setup().await;
        repo.insert(&product("p1", 500, 1)).await.unwrap();
        repo.update_price("p1", 750).await.unwrap();

        assert_eq!(repo.get_by_id("p1").await.unwrap().unwrap().price_minor, 750);
        assert!(repo.update_price("nope", 1).await.is_err());
    }
}
