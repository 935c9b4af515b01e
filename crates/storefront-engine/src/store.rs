//! # Storage Seams
//!
//! The engine talks to storage only through these traits. Two backends
//! implement all of them: [`crate::backend::memory::MemoryBackend`] and
//! [`crate::backend::sqlite::SqliteBackend`].
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │   Catalog    │   │ ClientDirectory  │   │  CartRepository  │
//! │ get_product  │   │  client_state    │   │  load / save     │
//! │ update_stock │   └──────────────────┘   └──────────────────┘
//! └──────────────┘
//! ┌──────────────────┐   ┌────────────────────┐   ┌──────────────────┐
//! │ CouponRepository │   │ PurchaseRepository │   │ RefundRepository │
//! │ insert / get     │   │ append / query     │   │ insert / resolve │
//! │ delete / redeem  │   └────────────────────┘   └──────────────────┘
//! └──────────────────┘
//! ```
//!
//! Two operations carry the atomicity the engine depends on:
//! - `Catalog::update_stock` must refuse (`Conflict`) a delta that would make
//!   stock negative, in the same step as applying it.
//! - `CouponRepository::redeem` must increment only while
//!   `used_count < max_uses`, in the same step as checking it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use storefront_core::{Cart, ClientState, Coupon, Product, Purchase, Refund, RefundStatus};

/// Backend-neutral storage failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate {field}: {value}")]
    Duplicate { field: String, value: String },

    /// A guarded write was refused (stock would go negative, and so on).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store could not be reached; retrying may succeed.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Collaborator Traits
// =============================================================================

/// The catalog collaborator. The engine only ever changes `stock`.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>>;

    /// Applies a stock delta and returns the new level.
    ///
    /// Fails with `NotFound` for an unknown product and with `Conflict` when
    /// the delta would make stock negative (nothing is written).
    async fn update_stock(&self, id: &str, delta: i64) -> StoreResult<i64>;
}

/// The account collaborator.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn client_state(&self, id: &str) -> StoreResult<ClientState>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn load(&self, client_id: &str) -> StoreResult<Option<Cart>>;
    async fn save(&self, cart: &Cart) -> StoreResult<()>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Fails with `Duplicate` when the code is taken.
    async fn insert(&self, coupon: &Coupon) -> StoreResult<()>;
    async fn get_by_code(&self, code: &str) -> StoreResult<Option<Coupon>>;
    async fn get_by_id(&self, id: &str) -> StoreResult<Option<Coupon>>;
    /// Removes a coupon and returns it; `NotFound` for an unknown id.
    async fn delete(&self, id: &str) -> StoreResult<Coupon>;
    /// Consumes one use. `Ok(false)` when none remain.
    async fn redeem(&self, code: &str) -> StoreResult<bool>;
}

#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    async fn append(&self, purchase: &Purchase) -> StoreResult<()>;
    async fn get(&self, id: &str) -> StoreResult<Option<Purchase>>;
    /// Newest first.
    async fn for_client(&self, client_id: &str) -> StoreResult<Vec<Purchase>>;
    /// `from <= created_at < to`, oldest first.
    async fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Purchase>>;
}

#[async_trait]
pub trait RefundRepository: Send + Sync {
    async fn insert(&self, refund: &Refund) -> StoreResult<()>;
    async fn get(&self, id: &str) -> StoreResult<Option<Refund>>;
    async fn list(&self) -> StoreResult<Vec<Refund>>;
    /// Moves a pending refund to `status`. `Ok(false)` if it was not pending.
    async fn resolve(
        &self,
        id: &str,
        status: RefundStatus,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<bool>;
}

/// Every store the engine needs, as shared trait objects.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn Catalog>,
    pub clients: Arc<dyn ClientDirectory>,
    pub carts: Arc<dyn CartRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub purchases: Arc<dyn PurchaseRepository>,
    pub refunds: Arc<dyn RefundRepository>,
}
