//! # In-Memory Backend
//!
//! Every store in one `std::sync::Mutex`. Each trait method takes the lock
//! once, so the guarded operations (`update_stock`, `redeem`, `resolve`)
//! check and write in a single step, the same way the SQL backend does it
//! with one conditional `UPDATE`.
//!
//! Two switches simulate collaborator failures:
//! - `set_unavailable(true)`: every call fails with `Unavailable`
//! - `fail_stock_releases(true)`: positive stock deltas fail, so
//!   compensating releases can be exercised

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use storefront_core::{
    Cart, ClientState, ClientStatus, Coupon, Product, Purchase, Refund, RefundStatus,
};

use crate::store::{
    CartRepository, Catalog, ClientDirectory, CouponRepository, PurchaseRepository,
    RefundRepository, StoreError, StoreResult, Stores,
};

#[derive(Debug, Default)]
struct MemoryState {
    products: HashMap<String, Product>,
    clients: HashMap<String, ClientStatus>,
    carts: HashMap<String, Cart>,
    /// Keyed by coupon id.
    coupons: HashMap<String, Coupon>,
    /// Append order.
    purchases: Vec<Purchase>,
    refunds: Vec<Refund>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
    fail_stock_releases: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps this backend as the full set of engine stores.
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

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state, or fails if the backend is switched off.
    fn reach(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory backend switched off".into()));
        }
        Ok(self.state())
    }

    // -------------------------------------------------------------------------
    // Seeding and inspection
    // -------------------------------------------------------------------------

    pub fn insert_product(&self, id: &str, name: &str, price_minor: i64, stock: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: id.to_string(),
            name: name.to_string(),
            price_minor,
            stock,
            created_at: now,
            updated_at: now,
        };
        self.state()
            .products
            .insert(id.to_string(), product.clone());
        product
    }

    pub fn set_price(&self, id: &str, price_minor: i64) {
        if let Some(p) = self.state().products.get_mut(id) {
            p.price_minor = price_minor;
            p.updated_at = Utc::now();
        }
    }

    pub fn set_client(&self, id: &str, status: ClientStatus) {
        self.state().clients.insert(id.to_string(), status);
    }

    pub fn stock_of(&self, id: &str) -> Option<i64> {
        self.state().products.get(id).map(|p| p.stock)
    }

    pub fn coupon_by_code(&self, code: &str) -> Option<Coupon> {
        self.state()
            .coupons
            .values()
            .find(|c| c.code == code)
            .cloned()
    }

    pub fn purchase_count(&self) -> usize {
        self.state().purchases.len()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_stock_releases(&self, fail: bool) {
        self.fail_stock_releases.store(fail, Ordering::SeqCst);
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

#[async_trait]
impl Catalog for MemoryBackend {
    async fn get_product(&self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.reach()?.products.get(id).cloned())
    }

    async fn update_stock(&self, id: &str, delta: i64) -> StoreResult<i64> {
        if delta > 0 && self.fail_stock_releases.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "stock release for {} refused",
                id
            )));
        }

        let mut state = self.reach()?;
        let product = state
            .products
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("Product", id))?;

        let next = product.stock + delta;
        if next < 0 {
            return Err(StoreError::Conflict(format!(
                "stock of {} would become {}",
                id, next
            )));
        }

        product.stock = next;
        product.updated_at = Utc::now();
        Ok(next)
    }
}

#[async_trait]
impl ClientDirectory for MemoryBackend {
    async fn client_state(&self, id: &str) -> StoreResult<ClientState> {
        let status = self.reach()?.clients.get(id).copied();
        Ok(ClientState::from_status(status))
    }
}

#[async_trait]
impl CartRepository for MemoryBackend {
    async fn load(&self, client_id: &str) -> StoreResult<Option<Cart>> {
        Ok(self.reach()?.carts.get(client_id).cloned())
    }

    async fn save(&self, cart: &Cart) -> StoreResult<()> {
        self.reach()?
            .carts
            .insert(cart.client_id.clone(), cart.clone());
        Ok(())
    }
}

#[async_trait]
impl CouponRepository for MemoryBackend {
    async fn insert(&self, coupon: &Coupon) -> StoreResult<()> {
        let mut state = self.reach()?;
        if state.coupons.values().any(|c| c.code == coupon.code) {
            return Err(StoreError::Duplicate {
                field: "code".into(),
                value: coupon.code.clone(),
            });
        }
        state.coupons.insert(coupon.id.clone(), coupon.clone());
        Ok(())
    }

    async fn get_by_code(&self, code: &str) -> StoreResult<Option<Coupon>> {
        Ok(self
            .reach()?
            .coupons
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<Coupon>> {
        Ok(self.reach()?.coupons.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> StoreResult<Coupon> {
        self.reach()?
            .coupons
            .remove(id)
            .ok_or_else(|| StoreError::not_found("Coupon", id))
    }

    async fn redeem(&self, code: &str) -> StoreResult<bool> {
        let mut state = self.reach()?;
        let coupon = state
            .coupons
            .values_mut()
            .find(|c| c.code == code)
            .ok_or_else(|| StoreError::not_found("Coupon", code))?;

        if coupon.is_exhausted() {
            return Ok(false);
        }
        coupon.used_count += 1;
        Ok(true)
    }
}

#[async_trait]
impl PurchaseRepository for MemoryBackend {
    async fn append(&self, purchase: &Purchase) -> StoreResult<()> {
        let mut state = self.reach()?;
        if state.purchases.iter().any(|p| p.id == purchase.id) {
            return Err(StoreError::Duplicate {
                field: "id".into(),
                value: purchase.id.clone(),
            });
        }
        state.purchases.push(purchase.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Purchase>> {
        Ok(self
            .reach()?
            .purchases
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn for_client(&self, client_id: &str) -> StoreResult<Vec<Purchase>> {
        let state = self.reach()?;
        let mut purchases: Vec<Purchase> = state
            .purchases
            .iter()
            .filter(|p| p.client_id == client_id)
            .cloned()
            .collect();
        // Stable sort keeps append order among equal timestamps
        purchases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(purchases)
    }

    async fn between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> StoreResult<Vec<Purchase>> {
        let state = self.reach()?;
        let mut purchases: Vec<Purchase> = state
            .purchases
            .iter()
            .filter(|p| p.created_at >= from && p.created_at < to)
            .cloned()
            .collect();
        purchases.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(purchases)
    }
}

#[async_trait]
impl RefundRepository for MemoryBackend {
    async fn insert(&self, refund: &Refund) -> StoreResult<()> {
        let mut state = self.reach()?;
        if !state.purchases.iter().any(|p| p.id == refund.purchase_id) {
            return Err(StoreError::Conflict(format!(
                "refund references unknown purchase {}",
                refund.purchase_id
            )));
        }
        state.refunds.push(refund.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<Refund>> {
        Ok(self.reach()?.refunds.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Refund>> {
        let mut refunds = self.reach()?.refunds.clone();
        refunds.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(refunds)
    }

    async fn resolve(
        &self,
        id: &str,
        status: RefundStatus,
        resolved_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.reach()?;
        let refund = state
            .refunds
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::not_found("Refund", id))?;

        if refund.status != RefundStatus::Pending {
            return Ok(false);
        }
        refund.status = status;
        refund.resolved_at = Some(resolved_at);
        Ok(true)
    }
}
