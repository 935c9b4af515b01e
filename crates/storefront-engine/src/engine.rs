//! # Engine Facade
//!
//! The one handle callers hold. Wires the stores together and exposes every
//! caller operation.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Engine                                    │
//! │                                                                         │
//! │   create_cart / add_item / apply_coupon / remove_coupon / get_cart      │
//! │            │                                                            │
//! │            ▼                                                            │
//! │       CartStore ──────────┬──────────────┐                              │
//! │            ▲              ▼              ▼                              │
//! │            │       InventoryStore   CouponLedger ◄── create/validate/   │
//! │   checkout │              ▲              ▲           delete/get coupon  │
//! │            │              │              │                              │
//! │   CheckoutOrchestrator ───┴──────────────┘                              │
//! │                                                                         │
//! │   RefundDesk ◄── request_refund / resolve_refund / list_refunds         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Cloning an `Engine` is cheap and every clone shares the same locks, so
//! clones can be handed to concurrent tasks freely.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use storefront_core::pricing::subtotal;
use storefront_core::validation::validate_id;
use storefront_core::{
    Cart, Coupon, CouponValidation, NewCoupon, Purchase, Refund, RefundStatus, ValidationError,
};

use crate::backend::memory::MemoryBackend;
use crate::backend::sqlite::SqliteBackend;
use crate::cart::CartStore;
use crate::checkout::CheckoutOrchestrator;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::inventory::InventoryStore;
use crate::ledger::CouponLedger;
use crate::refund::RefundDesk;
use crate::store::{PurchaseRepository, Stores};

#[derive(Clone)]
pub struct Engine {
    inventory: Arc<InventoryStore>,
    ledger: Arc<CouponLedger>,
    carts: Arc<CartStore>,
    checkout: Arc<CheckoutOrchestrator>,
    refunds: Arc<RefundDesk>,
    purchases: Arc<dyn PurchaseRepository>,
}

impl Engine {
    pub fn new(stores: Stores, config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let threshold = config.lock_prune_threshold;

        let inventory = Arc::new(InventoryStore::new(stores.catalog.clone(), threshold));
        let ledger = Arc::new(CouponLedger::new(stores.coupons.clone(), clock.clone(), threshold));
        let carts = Arc::new(CartStore::new(
            stores.carts.clone(),
            inventory.clone(),
            ledger.clone(),
            clock.clone(),
            config.cart_limits(),
            threshold,
        ));
        let checkout = Arc::new(CheckoutOrchestrator::new(
            carts.clone(),
            stores.clients.clone(),
            inventory.clone(),
            ledger.clone(),
            stores.purchases.clone(),
            clock.clone(),
        ));
        let refunds = Arc::new(RefundDesk::new(
            stores.refunds.clone(),
            stores.purchases.clone(),
            clock,
        ));

        Engine {
            inventory,
            ledger,
            carts,
            checkout,
            refunds,
            purchases: stores.purchases,
        }
    }

    /// An engine over a memory backend with default limits and wall-clock time.
    pub fn in_memory(backend: &Arc<MemoryBackend>) -> Self {
        Engine::new(
            backend.stores(),
            &EngineConfig::default(),
            Arc::new(SystemClock),
        )
    }

    /// Opens the configured SQLite database and builds an engine over it.
    ///
    /// The backend is returned too, for seeding and admin access.
    pub async fn open_sqlite(config: &EngineConfig) -> EngineResult<(Self, Arc<SqliteBackend>)> {
        let backend = Arc::new(SqliteBackend::open(config.db_config()).await?);
        let engine = Engine::new(backend.stores(), config, Arc::new(SystemClock));
        Ok((engine, backend))
    }

    // =========================================================================
    // Carts
    // =========================================================================

    pub async fn create_cart(&self, client_id: &str) -> EngineResult<Cart> {
        self.carts.create_cart(client_id).await
    }

    pub async fn add_item(&self, client_id: &str, product_id: &str, quantity: i64) -> EngineResult<Cart> {
        self.carts.add_item(client_id, product_id, quantity).await
    }

    pub async fn apply_coupon(&self, client_id: &str, code: &str) -> EngineResult<Cart> {
        self.carts.apply_coupon(client_id, code).await
    }

    pub async fn remove_coupon(&self, client_id: &str) -> EngineResult<Cart> {
        self.carts.remove_coupon(client_id).await
    }

    pub async fn get_cart(&self, client_id: &str) -> EngineResult<Cart> {
        self.carts.get_cart(client_id).await
    }

    /// Current stock of a product. Advisory; may be stale immediately.
    pub async fn available_stock(&self, product_id: &str) -> EngineResult<i64> {
        let product_id = validate_id("product id", product_id)?;
        self.inventory.available(&product_id).await
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    pub async fn checkout(&self, client_id: &str) -> EngineResult<Purchase> {
        self.checkout.checkout(client_id).await
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    pub async fn create_coupon(&self, new: NewCoupon) -> EngineResult<Coupon> {
        self.ledger.create(new).await
    }

    /// Validates a coupon against the client's cart at current prices.
    /// Never consumes a use.
    pub async fn validate_coupon(&self, code: &str, client_id: &str) -> EngineResult<CouponValidation> {
        let cart = self.carts.get_cart(client_id).await?;
        let lines = self.carts.priced_lines(&cart).await?;
        self.ledger.validate(code, subtotal(&lines)?).await
    }

    pub async fn delete_coupon(&self, id: &str) -> EngineResult<Coupon> {
        let id = validate_id("coupon id", id)?;
        self.ledger.delete(&id).await
    }

    pub async fn get_coupon(&self, code: &str) -> EngineResult<Coupon> {
        self.ledger.get(code).await
    }

    // =========================================================================
    // Purchases
    // =========================================================================

    pub async fn get_purchase(&self, id: &str) -> EngineResult<Purchase> {
        let id = validate_id("purchase id", id)?;
        self.purchases
            .get(&id)
            .await?
            .ok_or(EngineError::PurchaseNotFound(id))
    }

    /// A client's purchases, newest first.
    pub async fn purchases_for_client(&self, client_id: &str) -> EngineResult<Vec<Purchase>> {
        let client_id = validate_id("client id", client_id)?;
        Ok(self.purchases.for_client(&client_id).await?)
    }

    /// Purchases with `from <= created_at < to`, oldest first.
    pub async fn purchases_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> EngineResult<Vec<Purchase>> {
        if to <= from {
            return Err(ValidationError::InvalidWindow {
                field: "purchase range".to_string(),
            }
            .into());
        }
        Ok(self.purchases.between(from, to).await?)
    }

    /// Purchases made on one UTC calendar day.
    pub async fn purchases_for_day(&self, day: NaiveDate) -> EngineResult<Vec<Purchase>> {
        let from = day.and_time(NaiveTime::MIN).and_utc();
        self.purchases_between(from, from + Duration::days(1)).await
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    pub async fn request_refund(&self, purchase_id: &str, reason: &str) -> EngineResult<Refund> {
        self.refunds.request(purchase_id, reason).await
    }

    pub async fn resolve_refund(&self, refund_id: &str, status: RefundStatus) -> EngineResult<Refund> {
        self.refunds.resolve(refund_id, status).await
    }

    pub async fn list_refunds(&self) -> EngineResult<Vec<Refund>> {
        self.refunds.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use storefront_core::{ClientStatus, CouponDiscount, CouponRejection, Product};
    use storefront_db::{Client, DbConfig};

    fn save10(now: DateTime<Utc>) -> NewCoupon {
        NewCoupon {
            code: "SAVE10".into(),
            discount: CouponDiscount::Percentage { percent: 10 },
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(30),
            max_uses: 1,
            active: true,
            minimum_purchase_minor: 500,
        }
    }

    /// 2 × product at 500 (stock 10) with SAVE10, then a second checkout on a
    /// fresh cart that carried the same coupon.
    async fn run_save10_scenario(engine: &Engine) {
        let now = Utc::now();
        engine.create_coupon(save10(now)).await.unwrap();

        let cart = engine.add_item("alice", "prod-1", 2).await.unwrap();
        assert_eq!(cart.total_minor, 1000);

        // Bob attaches the coupon while one use is still left
        engine.add_item("bob", "prod-1", 2).await.unwrap();
        engine.apply_coupon("bob", "SAVE10").await.unwrap();

        let cart = engine.apply_coupon("alice", "save10").await.unwrap();
        assert_eq!(cart.discount_minor, 100);
        assert_eq!(cart.total_with_discount_minor, 900);

        let purchase = engine.checkout("alice").await.unwrap();
        assert_eq!(purchase.total_paid_minor, 900);
        assert_eq!(purchase.discount_minor, 100);
        assert_eq!(purchase.coupon_code.as_deref(), Some("SAVE10"));
        assert_eq!(engine.available_stock("prod-1").await.unwrap(), 8);
        assert_eq!(engine.get_coupon("SAVE10").await.unwrap().used_count, 1);

        let cart = engine.get_cart("alice").await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.coupon_code, None);
        assert_eq!(cart.total_with_discount_minor, 0);

        assert_eq!(
            engine.checkout("bob").await.unwrap_err(),
            EngineError::CouponExhausted {
                code: "SAVE10".into()
            }
        );
        assert_eq!(engine.available_stock("prod-1").await.unwrap(), 8);
        assert_eq!(engine.get_coupon("SAVE10").await.unwrap().used_count, 1);
        assert_eq!(engine.get_cart("bob").await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_save10_scenario_in_memory() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_product("prod-1", "Notebook", 500, 10);
        backend.set_client("alice", ClientStatus::Active);
        backend.set_client("bob", ClientStatus::Active);

        run_save10_scenario(&Engine::in_memory(&backend)).await;
    }

    #[tokio::test]
    async fn test_save10_scenario_on_sqlite() {
        let backend = Arc::new(SqliteBackend::open(DbConfig::in_memory()).await.unwrap());
        let db = backend.database();
        let now = Utc::now();
        db.products()
            .insert(&Product {
                id: "prod-1".into(),
                name: "Notebook".into(),
                price_minor: 500,
                stock: 10,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        for id in ["alice", "bob"] {
            let mut client = Client::new(id, id);
            client.status = ClientStatus::Active;
            db.clients().upsert(&client).await.unwrap();
        }

        let engine = Engine::new(
            backend.stores(),
            &EngineConfig::default(),
            Arc::new(SystemClock),
        );
        run_save10_scenario(&engine).await;

        assert_eq!(engine.purchases_for_client("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_validate_coupon_for_client() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_product("p", "Thing", 1000, 5);
        let engine = Engine::in_memory(&backend);
        engine.create_coupon(save10(Utc::now())).await.unwrap();

        let empty = engine.validate_coupon("SAVE10", "carol").await.unwrap();
        assert!(!empty.valid);
        assert!(matches!(
            empty.reason,
            Some(CouponRejection::BelowMinimumPurchase { total_minor: 0, .. })
        ));

        engine.add_item("carol", "p", 1).await.unwrap();
        let ok = engine.validate_coupon("SAVE10", "carol").await.unwrap();
        assert!(ok.valid);
        assert_eq!(ok.discount_minor, 100);
        assert_eq!(engine.get_coupon("SAVE10").await.unwrap().used_count, 0);
    }

    #[tokio::test]
    async fn test_delete_coupon() {
        let backend = Arc::new(MemoryBackend::new());
        let engine = Engine::in_memory(&backend);
        let coupon = engine.create_coupon(save10(Utc::now())).await.unwrap();

        engine.delete_coupon(&coupon.id).await.unwrap();
        assert!(matches!(
            engine.get_coupon("SAVE10").await,
            Err(EngineError::CouponNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_purchase_history_and_daily_report() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_product("p", "Thing", 100, 50);
        backend.set_client("c1", ClientStatus::Active);

        let start = "2026-03-14T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let engine = Engine::new(backend.stores(), &EngineConfig::default(), clock.clone());

        for _ in 0..3 {
            engine.add_item("c1", "p", 1).await.unwrap();
            engine.checkout("c1").await.unwrap();
            clock.advance(Duration::hours(8));
        }

        let history = engine.purchases_for_client("c1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].created_at > history[2].created_at);

        let day = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let sales = engine.purchases_for_day(day).await.unwrap();
        // 10:00 and 18:00; the third lands at 02:00 the next day
        assert_eq!(sales.len(), 2);
        assert!(sales[0].created_at < sales[1].created_at);

        assert!(matches!(
            engine.purchases_between(start, start).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_refund_flow() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_product("p", "Thing", 100, 5);
        backend.set_client("c1", ClientStatus::Active);
        let engine = Engine::in_memory(&backend);

        engine.add_item("c1", "p", 2).await.unwrap();
        let purchase = engine.checkout("c1").await.unwrap();

        let refund = engine.request_refund(&purchase.id, "arrived broken").await.unwrap();
        engine
            .resolve_refund(&refund.id, RefundStatus::Approved)
            .await
            .unwrap();

        let refunds = engine.list_refunds().await.unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].status, RefundStatus::Approved);
        // Refunds never touch stock
        assert_eq!(engine.available_stock("p").await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_stock_never_negative_under_concurrent_checkouts() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_product("hot", "Hot Item", 100, 5);
        backend.insert_product("side", "Side Item", 50, 100);
        let engine = Engine::in_memory(&backend);

        let clients: Vec<String> = (0..20).map(|i| format!("shopper-{}", i)).collect();
        for (i, id) in clients.iter().enumerate() {
            backend.set_client(id, ClientStatus::Active);
            // Alternate line order so products are carted in both orders
            if i % 2 == 0 {
                engine.add_item(id, "hot", 1).await.unwrap();
                engine.add_item(id, "side", 1).await.unwrap();
            } else {
                engine.add_item(id, "side", 1).await.unwrap();
                engine.add_item(id, "hot", 1).await.unwrap();
            }
        }

        let mut handles = Vec::new();
        for id in clients {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.checkout(&id).await.is_ok() }));
        }

        let mut won = 0;
        for h in handles {
            if h.await.unwrap() {
                won += 1;
            }
        }

        assert_eq!(won, 5);
        assert_eq!(backend.stock_of("hot"), Some(0));
        assert_eq!(backend.stock_of("side"), Some(95));
        assert_eq!(backend.purchase_count(), 5);
    }
}
