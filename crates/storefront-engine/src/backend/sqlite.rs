//! # SQLite Backend
//!
//! Adapts the storefront-db repositories to the engine's storage traits.
//!
//! ## Error Mapping
//! ```text
//! DbError::NotFound                          → StoreError::NotFound
//! DbError::UniqueViolation                   → StoreError::Duplicate
//! DbError::ConstraintViolation / ForeignKey  → StoreError::Conflict
//! ConnectionFailed / Busy / PoolExhausted    → StoreError::Unavailable
//! everything else                            → StoreError::Backend
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_core::{Cart, ClientState, Coupon, Product, Purchase, Refund, RefundStatus};
use storefront_db::{Database, DbConfig, DbError};

use crate::store::{self, StoreError, StoreResult, Stores};

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StoreError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => StoreError::Duplicate { field, value },
            DbError::ConstraintViolation { message } | DbError::ForeignKeyViolation { message } => {
                StoreError::Conflict(message)
            }
            e if e.is_transient() => StoreError::Unavailable(e.to_string()),
            e => StoreError::Backend(e.to_string()),
        }
    }
}

/// All engine stores backed by one SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db: Database,
}

impl SqliteBackend {
    pub fn new(db: Database) -> Self {
        SqliteBackend { db }
    }

    /// Opens (and migrates) the database described by `config`.
    pub async fn open(config: DbConfig) -> StoreResult<Self> {
        Ok(SqliteBackend::new(Database::new(config).await?))
    }

    /// The underlying database, for seeding and admin work.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn stores(self: &Arc<Self>) -> Stores {
        Stores {
            catalog: self.clone(),
            clients: self.clone(),
            carts: self.clone(),
            coupons: self.clone(),
            purchases: self.clone(),
            refunds: self.clone(),
        }
    }
}

#[async_trait]
impl store::Catalog for SqliteBackend {
    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.db.products().get_by_id(id).await?)
    }

    async fn update_stock(&self, id: &str, delta: i64) -> StoreResult<i64> {
        Ok(self.db.products().update_stock(id, delta).await?)
    }
}

#[async_trait]
impl store::ClientDirectory for SqliteBackend {
    async fn client_state(&self, id: &str) -> StoreResult<ClientState> {
        let status = self.db.clients().get_status(id).await?;
        Ok(ClientState::from_status(status))
    }
}

#[async_trait]
impl store::CartRepository for SqliteBackend {
    async fn load(&self, client_id: &str) -> StoreResult<Option<Cart>> {
        Ok(self.db.carts().get(client_id).await?)
    }

    async fn save(&self, cart: &Cart) -> StoreResult<()> {
        Ok(self.db.carts().save(cart).await?)
    }
}

#[async_trait]
impl store::CouponRepository for SqliteBackend {
    async fn insert(&self, coupon: &Coupon) -> StoreResult<()> {
        Ok(self.db.coupons().insert(coupon).await?)
    }

    async fn get_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
        Ok(self.db.coupons().get_by_code(code).await?)
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<Coupon>> {
        Ok(self.db.coupons().get_by_id(id).await?)
    }

    async fn delete(&self, id: &str) -> StoreResult<Coupon> {
        Ok(self.db.coupons().delete(id).await?)
    }

    async fn redeem(&self, code: &str) -> StoreResult<bool> {
        Ok(self.db.coupons().redeem(code).await?)
    }
}

#[async_trait]
impl store::PurchaseRepository for SqliteBackend {
    async fn append(&self, purchase: &Purchase) -> StoreResult<()> {
        Ok(self.db.purchases().insert(purchase).await?)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Purchase>> {
        Ok(self.db.purchases().get_by_id(id).await?)
    }

    async fn for_client(&self, client_id: &str) -> StoreResult<Vec<Purchase>> {
        Ok(self.db.purchases().list_for_client(client_id).await?)
    }

    async fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Purchase>> {
        Ok(self.db.purchases().list_between(from, to).await?)
    }
}

#[async_trait]
impl store::RefundRepository for SqliteBackend {
    async fn insert(&self, refund: &Refund) -> StoreResult<()> {
        Ok(self.db.refunds().insert(refund).await?)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Refund>> {
        Ok(self.db.refunds().get_by_id(id).await?)
    }

    async fn list(&self) -> StoreResult<Vec<Refund>> {
        Ok(self.db.refunds().list().await?)
    }

    async fn resolve(
        &self,
        id: &str,
        status: RefundStatus,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(self.db.refunds().resolve(id, status, resolved_at).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Catalog, ClientDirectory};
    use storefront_core::ClientStatus;
    use storefront_db::Client;

    async fn backend() -> SqliteBackend {
        SqliteBackend::open(DbConfig::in_memory()).await.unwrap()
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            StoreError::from(DbError::not_found("Product", "p1")),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            StoreError::from(DbError::ConstraintViolation {
                message: "CHECK constraint failed: stock".into()
            }),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            StoreError::from(DbError::Busy("database is locked".into())),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            StoreError::from(DbError::QueryFailed("syntax".into())),
            StoreError::Backend(_)
        ));
    }

    #[tokio::test]
    async fn test_guarded_stock_update() {
        let backend = backend().await;
        let now = Utc::now();
        backend
            .database()
            .products()
            .insert(&Product {
                id: "p1".into(),
                name: "Widget".into(),
                price_minor: 500,
                stock: 1,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        assert_eq!(backend.update_stock("p1", -1).await.unwrap(), 0);
        assert!(matches!(
            backend.update_stock("p1", -1).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_client_state() {
        let backend = backend().await;
        let mut client = Client::new("c1", "Ana");
        client.status = ClientStatus::Rejected;
        backend.database().clients().upsert(&client).await.unwrap();

        assert!(backend.client_state("c1").await.unwrap().blocked);
        assert!(!backend.client_state("c2").await.unwrap().exists);
    }
}
