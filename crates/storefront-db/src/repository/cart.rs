//! # Cart Repository
//!
//! One `carts` row per client plus its ordered `cart_items` lines.
//!
//! ```text
//! carts (client_id PK) ──1:N──► cart_items (client_id, product_id, position)
//! ```
//!
//! A save replaces the whole cart inside one transaction, so readers never see
//! a header whose totals disagree with its lines.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use storefront_core::{Cart, CartItem};

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    client_id: String,
    coupon_code: Option<String>,
    total_minor: i64,
    discount_minor: i64,
    total_with_discount_minor: i64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Loads a client's cart with lines in insertion order.
    pub async fn get(&self, client_id: &str) -> DbResult<Option<Cart>> {
        let row = sqlx::query_as::<_, CartRow>(
            r#"
            SELECT client_id, coupon_code, total_minor, discount_minor,
                   total_with_discount_minor, updated_at
            FROM carts
            WHERE client_id = ?1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT product_id, quantity
            FROM cart_items
            WHERE client_id = ?1
            ORDER BY position
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(product_id, quantity)| CartItem {
            product_id,
            quantity,
        })
        .collect();

        Ok(Some(Cart {
            client_id: row.client_id,
            items,
            total_minor: row.total_minor,
            coupon_code: row.coupon_code,
            discount_minor: row.discount_minor,
            total_with_discount_minor: row.total_with_discount_minor,
            updated_at: row.updated_at,
        }))
    }

    /// Writes the cart header and replaces all of its lines.
    pub async fn save(&self, cart: &Cart) -> DbResult<()> {
        debug!(
            client_id = %cart.client_id,
            lines = cart.items.len(),
            total = cart.total_minor,
            "Saving cart"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO carts (
                client_id, coupon_code, total_minor, discount_minor,
                total_with_discount_minor, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(client_id) DO UPDATE SET
                coupon_code = excluded.coupon_code,
                total_minor = excluded.total_minor,
                discount_minor = excluded.discount_minor,
                total_with_discount_minor = excluded.total_with_discount_minor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&cart.client_id)
        .bind(&cart.coupon_code)
        .bind(cart.total_minor)
        .bind(cart.discount_minor)
        .bind(cart.total_with_discount_minor)
        .bind(cart.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cart_items WHERE client_id = ?1")
            .bind(&cart.client_id)
            .execute(&mut *tx)
            .await?;

        for (position, item) in cart.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cart_items (client_id, product_id, quantity, position)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&cart.client_id)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use storefront_core::Product;

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        for id in ["zeta", "alpha"] {
            db.products()
                .insert(&Product {
                    id: id.to_string(),
                    name: id.to_string(),
                    price_minor: 100,
                    stock: 5,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_missing_cart_is_none() {
        let db = setup().await;
        assert!(db.carts().get("c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_preserves_line_order_and_totals() {
        let db = setup().await;
        let mut cart = Cart::new("c1", Utc::now());
        cart.items = vec![
            CartItem {
                product_id: "zeta".to_string(),
                quantity: 2,
            },
            CartItem {
                product_id: "alpha".to_string(),
                quantity: 1,
            },
        ];
        cart.coupon_code = Some("SAVE10".to_string());
        cart.total_minor = 300;
        cart.discount_minor = 30;
        cart.total_with_discount_minor = 270;

        db.carts().save(&cart).await.unwrap();
        let loaded = db.carts().get("c1").await.unwrap().unwrap();

        assert_eq!(loaded.items, cart.items);
        assert_eq!(loaded.coupon_code.as_deref(), Some("SAVE10"));
        assert_eq!(loaded.total_with_discount_minor, 270);
    }

    #[tokio::test]
    async fn test_save_replaces_lines() {
        let db = setup().await;
        let mut cart = Cart::new("c1", Utc::now());
        cart.items.push(CartItem {
            product_id: "alpha".to_string(),
            quantity: 1,
        });
        cart.total_minor = 100;
        cart.total_with_discount_minor = 100;
        db.carts().save(&cart).await.unwrap();

        cart.reset(Utc::now());
        db.carts().save(&cart).await.unwrap();

        let loaded = db.carts().get("c1").await.unwrap().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.total_minor, 0);
    }
}
