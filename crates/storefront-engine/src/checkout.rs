//! # Checkout Orchestrator
//!
//! Turns a cart into a purchase, all or nothing.
//!
//! ## State Machine
//! ```text
//!  Idle ──► Validating ──► Reserving ──► PartiallyReserved ──► Finalizing ──► Committed
//!               │              │                │                   │
//!               │              │                └──────┐   ┌────────┘
//!               │              │                       ▼   ▼
//!               │              │                    Compensating
//!               │              │                         │
//!               └──────────────┴────────► Rejected ◄─────┘
//! ```
//!
//! | State             | Work                                                   |
//! |-------------------|--------------------------------------------------------|
//! | Validating        | client exists and is not blocked, cart not empty,     |
//! |                   | lines priced, attached coupon hard-checked            |
//! | Reserving         | `check_and_reserve` per line, sorted by product id    |
//! | PartiallyReserved | at least one line holds stock                         |
//! | Finalizing        | redeem coupon, reset cart, append purchase            |
//! | Compensating      | release every reservation, newest first               |
//!
//! The client's lock is held for the whole run, so a checkout never races
//! cart edits of the same client. Product locks are taken one line at a time
//! in product id order and never held together, so two checkouts over
//! overlapping products cannot deadlock.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use storefront_core::pricing::quote;
use storefront_core::validation::validate_id;
use storefront_core::{
    Cart, CartTotals, Coupon, CouponOutcome, CouponRejection, PricedLine, Purchase,
};

use crate::cart::CartStore;
use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::inventory::{InventoryStore, ReservationSet};
use crate::ledger::CouponLedger;
use crate::store::{ClientDirectory, PurchaseRepository};

// =============================================================================
// State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    Idle,
    Validating,
    Reserving,
    PartiallyReserved,
    Finalizing,
    Compensating,
    Committed,
    Rejected,
}

impl CheckoutState {
    pub fn can_transition_to(self, next: CheckoutState) -> bool {
        use CheckoutState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Reserving)
                | (Validating, Rejected)
                | (Reserving, PartiallyReserved)
                | (Reserving, Rejected)
                | (PartiallyReserved, Finalizing)
                | (PartiallyReserved, Compensating)
                | (Finalizing, Committed)
                | (Finalizing, Compensating)
                | (Compensating, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CheckoutState::Committed | CheckoutState::Rejected)
    }
}

/// One checkout run's progress through [`CheckoutState`].
#[derive(Debug)]
pub struct CheckoutFlow {
    client_id: String,
    history: Vec<CheckoutState>,
}

impl CheckoutFlow {
    pub fn new(client_id: &str) -> Self {
        CheckoutFlow {
            client_id: client_id.to_string(),
            history: vec![CheckoutState::Idle],
        }
    }

    pub fn state(&self) -> CheckoutState {
        self.history
            .last()
            .copied()
            .unwrap_or(CheckoutState::Idle)
    }

    /// Every state visited so far, starting with `Idle`.
    pub fn history(&self) -> &[CheckoutState] {
        &self.history
    }

    /// Moves to `next`. An illegal transition is a bug and panics.
    pub fn advance(&mut self, next: CheckoutState) {
        let current = self.state();
        assert!(
            current.can_transition_to(next),
            "illegal checkout transition {:?} -> {:?}",
            current,
            next
        );
        debug!(client_id = %self.client_id, from = ?current, to = ?next, "Checkout state");
        self.history.push(next);
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Everything Validating established.
struct Validated {
    cart: Cart,
    lines: Vec<PricedLine>,
    totals: CartTotals,
    coupon: Option<Coupon>,
}

pub struct CheckoutOrchestrator {
    carts: Arc<CartStore>,
    clients: Arc<dyn ClientDirectory>,
    inventory: Arc<InventoryStore>,
    ledger: Arc<CouponLedger>,
    purchases: Arc<dyn PurchaseRepository>,
    clock: Arc<dyn Clock>,
}

impl CheckoutOrchestrator {
    pub fn new(
        carts: Arc<CartStore>,
        clients: Arc<dyn ClientDirectory>,
        inventory: Arc<InventoryStore>,
        ledger: Arc<CouponLedger>,
        purchases: Arc<dyn PurchaseRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CheckoutOrchestrator {
            carts,
            clients,
            inventory,
            ledger,
            purchases,
            clock,
        }
    }

    /// Checks out the client's cart.
    ///
    /// On any error, stock levels and coupon usage are what they were before
    /// the call and the cart is unchanged.
    pub async fn checkout(&self, client_id: &str) -> EngineResult<Purchase> {
        let client_id = validate_id("client id", client_id)?;
        let mut flow = CheckoutFlow::new(&client_id);
        self.run(&client_id, &mut flow).await
    }

    pub(crate) async fn run(&self, client_id: &str, flow: &mut CheckoutFlow) -> EngineResult<Purchase> {
        let _client = self.carts.lock_client(client_id).await;

        flow.advance(CheckoutState::Validating);
        let validated = match self.validate(client_id).await {
            Ok(v) => v,
            Err(e) => {
                flow.advance(CheckoutState::Rejected);
                debug!(client_id, error = %e, "Checkout rejected during validation");
                return Err(e);
            }
        };

        flow.advance(CheckoutState::Reserving);
        let mut reserved = ReservationSet::new();
        if let Err(cause) = self.reserve(&validated.lines, &mut reserved, flow).await {
            if reserved.is_empty() {
                flow.advance(CheckoutState::Rejected);
                return Err(cause);
            }
            return Err(self.compensate(client_id, flow, &mut reserved, cause).await);
        }

        flow.advance(CheckoutState::Finalizing);
        match self.finalize(client_id, validated).await {
            Ok(purchase) => {
                reserved.commit();
                flow.advance(CheckoutState::Committed);
                info!(
                    client_id,
                    purchase_id = %purchase.id,
                    lines = purchase.items.len(),
                    total_paid = purchase.total_paid_minor,
                    coupon = ?purchase.coupon_code,
                    "Checkout committed"
                );
                Ok(purchase)
            }
            Err(cause) => Err(self.compensate(client_id, flow, &mut reserved, cause).await),
        }
    }

    /// No side effects.
    async fn validate(&self, client_id: &str) -> EngineResult<Validated> {
        let client = self.clients.client_state(client_id).await?;
        if !client.exists {
            return Err(EngineError::ClientNotFound {
                client_id: client_id.to_string(),
            });
        }
        if client.blocked {
            return Err(EngineError::ClientBlocked {
                client_id: client_id.to_string(),
            });
        }

        let cart = match self.carts.load(client_id).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => {
                return Err(EngineError::EmptyCart {
                    client_id: client_id.to_string(),
                })
            }
        };

        let lines = self.carts.priced_lines(&cart).await?;

        let coupon = match &cart.coupon_code {
            Some(code) => Some(
                self.ledger
                    .find(code)
                    .await?
                    .ok_or_else(|| EngineError::coupon(code, CouponRejection::NotFound))?,
            ),
            None => None,
        };

        let priced = quote(&lines, coupon.as_ref(), self.clock.now())?;
        if let CouponOutcome::Rejected(reason) = priced.coupon {
            let code = cart.coupon_code.clone().unwrap_or_default();
            return Err(EngineError::coupon(&code, reason));
        }

        Ok(Validated {
            cart,
            lines,
            totals: priced.totals,
            coupon,
        })
    }

    /// Reserves every line in product id order, stopping at the first failure.
    async fn reserve(
        &self,
        lines: &[PricedLine],
        reserved: &mut ReservationSet,
        flow: &mut CheckoutFlow,
    ) -> EngineResult<()> {
        let mut ordered: Vec<&PricedLine> = lines.iter().collect();
        ordered.sort_by(|a, b| a.product_id.cmp(&b.product_id));

        for line in ordered {
            let check = self
                .inventory
                .check_and_reserve(&line.product_id, line.quantity)
                .await?;

            if !check.ok {
                return Err(EngineError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    available: check.available,
                    requested: line.quantity,
                });
            }

            if reserved.is_empty() {
                flow.advance(CheckoutState::PartiallyReserved);
            }
            reserved.push(&line.product_id, line.quantity);
        }
        Ok(())
    }

    /// Redeems the coupon, then writes the reset cart and the purchase.
    ///
    /// Appending the purchase is the commit point. If it fails the previous
    /// cart is written back; the coupon use cannot be returned.
    async fn finalize(&self, client_id: &str, validated: Validated) -> EngineResult<Purchase> {
        let Validated {
            cart,
            lines,
            totals,
            coupon,
        } = validated;

        if let Some(coupon) = &coupon {
            self.ledger.redeem(&coupon.code).await?;
        }

        let now = self.clock.now();
        let purchase = Purchase {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            items: lines.iter().map(PricedLine::to_purchase_line).collect(),
            total_minor: totals.total.minor(),
            discount_minor: totals.discount.minor(),
            coupon_code: coupon.map(|c| c.code),
            total_paid_minor: totals.total_with_discount.minor(),
            created_at: now,
        };

        let mut emptied = cart.clone();
        emptied.reset(now);
        if let Err(e) = self.carts.save(&emptied).await {
            self.log_lost_redemption(&purchase, &e);
            return Err(e);
        }

        if let Err(e) = self.purchases.append(&purchase).await {
            let e = EngineError::from(e);
            if let Err(restore) = self.carts.save(&cart).await {
                error!(client_id, error = %restore, "Could not restore cart after failed checkout");
            }
            self.log_lost_redemption(&purchase, &e);
            return Err(e);
        }

        Ok(purchase)
    }

    async fn compensate(
        &self,
        client_id: &str,
        flow: &mut CheckoutFlow,
        reserved: &mut ReservationSet,
        cause: EngineError,
    ) -> EngineError {
        flow.advance(CheckoutState::Compensating);
        warn!(
            client_id,
            error = %cause,
            reservations = reserved.reservations().len(),
            "Checkout failed; releasing reserved stock"
        );

        let released = reserved.release_all(&self.inventory, &cause).await;
        flow.advance(CheckoutState::Rejected);

        match released {
            Ok(()) => cause,
            Err(compensation) => compensation,
        }
    }

    fn log_lost_redemption(&self, purchase: &Purchase, cause: &EngineError) {
        if let Some(code) = &purchase.coupon_code {
            error!(
                client_id = %purchase.client_id,
                code = %code,
                error = %cause,
                "Checkout failed after coupon redemption; one use was consumed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::clock::FixedClock;
    use crate::store::{Catalog, CouponRepository, StoreError, StoreResult};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use storefront_core::{CartLimits, ClientStatus, CoreError, CouponDiscount, NewCoupon};

    /// Purchase log that refuses every append; reads go to the backend.
    struct OfflinePurchaseLog(Arc<MemoryBackend>);

    #[async_trait]
    impl PurchaseRepository for OfflinePurchaseLog {
        async fn append(&self, _purchase: &Purchase) -> StoreResult<()> {
            Err(StoreError::Unavailable("purchase log offline".into()))
        }

        async fn get(&self, id: &str) -> StoreResult<Option<Purchase>> {
            PurchaseRepository::get(self.0.as_ref(), id).await
        }

        async fn for_client(&self, client_id: &str) -> StoreResult<Vec<Purchase>> {
            self.0.for_client(client_id).await
        }

        async fn between(
            &self,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> StoreResult<Vec<Purchase>> {
            self.0.between(from, to).await
        }
    }

    struct Fixture {
        backend: Arc<MemoryBackend>,
        clock: Arc<FixedClock>,
        ledger: Arc<CouponLedger>,
        carts: Arc<CartStore>,
        checkout: CheckoutOrchestrator,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_product("a", "Apple", 500, 10);
        backend.insert_product("b", "Banana", 300, 1);
        backend.set_client("c1", ClientStatus::Active);
        backend.set_client("c2", ClientStatus::Pending);
        backend.set_client("banned", ClientStatus::Rejected);

        let clock = Arc::new(FixedClock::new(Utc::now()));
        let inventory = Arc::new(InventoryStore::new(backend.clone(), 64));
        let ledger = Arc::new(CouponLedger::new(backend.clone(), clock.clone(), 64));
        let carts = Arc::new(CartStore::new(
            backend.clone(),
            inventory.clone(),
            ledger.clone(),
            clock.clone(),
            CartLimits::default(),
            64,
        ));
        let checkout = CheckoutOrchestrator::new(
            carts.clone(),
            backend.clone(),
            inventory,
            ledger.clone(),
            backend.clone(),
            clock.clone(),
        );

        Fixture {
            backend,
            clock,
            ledger,
            carts,
            checkout,
        }
    }

    fn coupon(clock: &FixedClock, code: &str, max_uses: i64) -> NewCoupon {
        NewCoupon {
            code: code.into(),
            discount: CouponDiscount::Percentage { percent: 10 },
            valid_from: clock.now() - Duration::days(1),
            valid_until: clock.now() + Duration::days(1),
            max_uses,
            active: true,
            minimum_purchase_minor: 500,
        }
    }

    #[test]
    fn test_transition_table() {
        use CheckoutState::*;
        assert!(Idle.can_transition_to(Validating));
        assert!(Reserving.can_transition_to(Rejected));
        assert!(PartiallyReserved.can_transition_to(Compensating));
        assert!(!PartiallyReserved.can_transition_to(Rejected));
        assert!(!Validating.can_transition_to(Compensating));
        assert!(!Committed.can_transition_to(Compensating));
        assert!(Committed.is_terminal() && Rejected.is_terminal());
    }

    #[test]
    #[should_panic(expected = "illegal checkout transition")]
    fn test_illegal_transition_panics() {
        let mut flow = CheckoutFlow::new("c1");
        flow.advance(CheckoutState::Finalizing);
    }

    #[tokio::test]
    async fn test_successful_checkout() {
        let f = fixture();
        f.carts.add_item("c1", "a", 2).await.unwrap();
        f.carts.add_item("c1", "b", 1).await.unwrap();

        let mut flow = CheckoutFlow::new("c1");
        let purchase = f.checkout.run("c1", &mut flow).await.unwrap();

        assert_eq!(purchase.total_minor, 1300);
        assert_eq!(purchase.total_paid_minor, 1300);
        assert_eq!(purchase.items.len(), 2);
        assert_eq!(purchase.items[0].unit_price_minor, 500);
        assert_eq!(f.backend.stock_of("a"), Some(8));
        assert_eq!(f.backend.stock_of("b"), Some(0));
        assert_eq!(f.backend.purchase_count(), 1);

        use CheckoutState::*;
        assert_eq!(
            flow.history(),
            &[Idle, Validating, Reserving, PartiallyReserved, Finalizing, Committed]
        );

        let cart = f.carts.get_cart("c1").await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.coupon_code, None);
        assert_eq!(cart.total_minor, 0);
    }

    #[tokio::test]
    async fn test_validation_failures_have_no_side_effects() {
        let f = fixture();

        assert_eq!(
            f.checkout.checkout("c1").await.unwrap_err(),
            EngineError::EmptyCart {
                client_id: "c1".into()
            }
        );

        f.carts.add_item("banned", "a", 1).await.unwrap();
        assert_eq!(
            f.checkout.checkout("banned").await.unwrap_err(),
            EngineError::ClientBlocked {
                client_id: "banned".into()
            }
        );

        f.carts.add_item("stranger", "a", 1).await.unwrap();
        assert!(matches!(
            f.checkout.checkout("stranger").await,
            Err(EngineError::ClientNotFound { .. })
        ));

        assert_eq!(f.backend.stock_of("a"), Some(10));
        assert_eq!(f.backend.purchase_count(), 0);
    }

    #[tokio::test]
    async fn test_pending_client_may_purchase() {
        let f = fixture();
        f.carts.add_item("c2", "a", 1).await.unwrap();
        assert!(f.checkout.checkout("c2").await.is_ok());
    }

    #[tokio::test]
    async fn test_insufficient_second_line_restores_first() {
        let f = fixture();
        f.carts.add_item("c1", "a", 2).await.unwrap();
        f.carts.add_item("c1", "b", 1).await.unwrap();
        // Someone else buys the last banana after it was carted
        f.carts.add_item("c2", "b", 1).await.unwrap();
        f.checkout.checkout("c2").await.unwrap();

        let mut flow = CheckoutFlow::new("c1");
        let err = f.checkout.run("c1", &mut flow).await.unwrap_err();

        assert_eq!(
            err,
            EngineError::InsufficientStock {
                product_id: "b".into(),
                available: 0,
                requested: 1,
            }
        );
        assert_eq!(f.backend.stock_of("a"), Some(10));
        assert_eq!(f.backend.purchase_count(), 1);
        assert_eq!(f.carts.get_cart("c1").await.unwrap().items.len(), 2);

        use CheckoutState::*;
        assert_eq!(
            flow.history(),
            &[Idle, Validating, Reserving, PartiallyReserved, Compensating, Rejected]
        );
    }

    #[tokio::test]
    async fn test_insufficient_first_line_skips_compensation() {
        let f = fixture();
        f.carts.add_item("c1", "b", 1).await.unwrap();
        f.backend.update_stock("b", -1).await.unwrap();

        let mut flow = CheckoutFlow::new("c1");
        assert!(f.checkout.run("c1", &mut flow).await.is_err());

        use CheckoutState::*;
        assert_eq!(flow.history(), &[Idle, Validating, Reserving, Rejected]);
    }

    #[tokio::test]
    async fn test_coupon_is_redeemed_once() {
        let f = fixture();
        f.ledger.create(coupon(&f.clock, "SAVE10", 1)).await.unwrap();

        f.carts.add_item("c1", "a", 2).await.unwrap();
        f.carts.apply_coupon("c1", "SAVE10").await.unwrap();
        let purchase = f.checkout.checkout("c1").await.unwrap();
        assert_eq!(purchase.discount_minor, 100);
        assert_eq!(purchase.total_paid_minor, 900);
        assert_eq!(purchase.coupon_code.as_deref(), Some("SAVE10"));

        // Validating already sees the exhausted coupon on the second cart
        f.carts.add_item("c2", "a", 2).await.unwrap();
        assert_eq!(
            f.carts.apply_coupon("c2", "SAVE10").await.unwrap_err(),
            EngineError::CouponExhausted {
                code: "SAVE10".into()
            }
        );
    }

    #[tokio::test]
    async fn test_coupon_exhausted_at_redemption_compensates() {
        let f = fixture();
        f.ledger.create(coupon(&f.clock, "LAST", 1)).await.unwrap();

        f.carts.add_item("c1", "a", 2).await.unwrap();
        f.carts.apply_coupon("c1", "LAST").await.unwrap();
        // The last use goes elsewhere between validation and redemption
        f.ledger.redeem("LAST").await.unwrap();

        let err = f.checkout.checkout("c1").await.unwrap_err();
        assert_eq!(
            err,
            EngineError::CouponExhausted {
                code: "LAST".into()
            }
        );
        assert_eq!(f.backend.stock_of("a"), Some(10));
        assert_eq!(f.backend.purchase_count(), 0);
    }

    #[tokio::test]
    async fn test_deleted_coupon_hard_fails_checkout() {
        let f = fixture();
        let created = f.ledger.create(coupon(&f.clock, "GONE", 5)).await.unwrap();
        f.carts.add_item("c1", "a", 2).await.unwrap();
        f.carts.apply_coupon("c1", "GONE").await.unwrap();
        f.backend.delete(&created.id).await.unwrap();

        assert!(matches!(
            f.checkout.checkout("c1").await,
            Err(EngineError::CouponRejected {
                reason: CouponRejection::NotFound,
                ..
            })
        ));
        assert_eq!(f.backend.stock_of("a"), Some(10));
    }

    #[tokio::test]
    async fn test_failed_release_surfaces_compensation_error() {
        let f = fixture();
        f.carts.add_item("c1", "a", 1).await.unwrap();
        f.carts.add_item("c1", "b", 1).await.unwrap();
        f.backend.update_stock("b", -1).await.unwrap();
        f.backend.fail_stock_releases(true);

        let err = f.checkout.checkout("c1").await.unwrap_err();
        match err {
            EngineError::CompensationFailed { cause, unreleased } => {
                assert!(cause.contains("Insufficient stock for b"));
                assert_eq!(unreleased, vec![("a".to_string(), 1)]);
            }
            other => panic!("expected CompensationFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_purchase_append_restores_stock_and_cart() {
        let f = fixture();
        f.ledger.create(coupon(&f.clock, "SAVE10", 5)).await.unwrap();
        f.carts.add_item("c1", "a", 2).await.unwrap();
        f.carts.apply_coupon("c1", "SAVE10").await.unwrap();

        let checkout = CheckoutOrchestrator::new(
            f.carts.clone(),
            f.backend.clone(),
            Arc::new(InventoryStore::new(f.backend.clone(), 64)),
            f.ledger.clone(),
            Arc::new(OfflinePurchaseLog(f.backend.clone())),
            f.clock.clone(),
        );

        let mut flow = CheckoutFlow::new("c1");
        let err = checkout.run("c1", &mut flow).await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(f.backend.stock_of("a"), Some(10));
        assert_eq!(f.backend.purchase_count(), 0);

        let cart = f.carts.get_cart("c1").await.unwrap();
        assert_eq!(cart.quantity_of("a"), 2);
        assert_eq!(cart.coupon_code.as_deref(), Some("SAVE10"));
        assert_eq!(cart.total_with_discount_minor, 900);

        // Redemption happened before the append and is not returned
        assert_eq!(f.backend.coupon_by_code("SAVE10").unwrap().used_count, 1);

        use CheckoutState::*;
        assert_eq!(
            flow.history(),
            &[
                Idle,
                Validating,
                Reserving,
                PartiallyReserved,
                Finalizing,
                Compensating,
                Rejected
            ]
        );
    }

    #[tokio::test]
    async fn test_overflowing_cart_total_is_rejected_before_reserving() {
        let f = fixture();
        f.carts.add_item("c1", "a", 2).await.unwrap();
        f.backend.set_price("a", i64::MAX);

        let mut flow = CheckoutFlow::new("c1");
        assert_eq!(
            f.checkout.run("c1", &mut flow).await.unwrap_err(),
            EngineError::Core(CoreError::AmountOverflow)
        );
        assert_eq!(f.backend.stock_of("a"), Some(10));

        use CheckoutState::*;
        assert_eq!(flow.history(), &[Idle, Validating, Rejected]);
    }

    #[tokio::test]
    async fn test_unavailable_store_is_transient() {
        let f = fixture();
        f.carts.add_item("c1", "a", 1).await.unwrap();
        f.backend.set_unavailable(true);

        let err = f.checkout.checkout("c1").await.unwrap_err();
        assert!(err.is_transient());

        f.backend.set_unavailable(false);
        assert_eq!(f.backend.stock_of("a"), Some(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_racing_checkouts_for_the_last_unit() {
        let f = fixture();
        let clients: Vec<String> = (0..8).map(|i| format!("racer-{}", i)).collect();
        for id in &clients {
            f.backend.set_client(id, ClientStatus::Active);
            f.carts.add_item(id, "b", 1).await.unwrap();
        }

        let checkout = Arc::new(f.checkout);
        let mut handles = Vec::new();
        for id in clients {
            let checkout = checkout.clone();
            handles.push(tokio::spawn(async move { checkout.checkout(&id).await }));
        }

        let mut won = 0;
        let mut out_of_stock = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => won += 1,
                Err(EngineError::InsufficientStock { .. }) => out_of_stock += 1,
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(won, 1);
        assert_eq!(out_of_stock, 7);
        assert_eq!(f.backend.stock_of("b"), Some(0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_checkouts_for_the_last_coupon_use() {
        let f = fixture();
        f.ledger.create(coupon(&f.clock, "ONCE", 1)).await.unwrap();
        for id in ["c1", "c2"] {
            f.carts.add_item(id, "a", 2).await.unwrap();
            f.carts.apply_coupon(id, "ONCE").await.unwrap();
        }

        let checkout = Arc::new(f.checkout);
        let first = {
            let checkout = checkout.clone();
            tokio::spawn(async move { checkout.checkout("c1").await })
        };
        let second = {
            let checkout = checkout.clone();
            tokio::spawn(async move { checkout.checkout("c2").await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let exhausted = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::CouponExhausted { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(exhausted, 1);
        assert_eq!(f.backend.coupon_by_code("ONCE").unwrap().used_count, 1);
        // Only the winner's two units left the shelf
        assert_eq!(f.backend.stock_of("a"), Some(8));
    }

    #[tokio::test]
    async fn test_coupon_rejection_never_touches_usage() {
        let f = fixture();
        let created = f.ledger.create(coupon(&f.clock, "SAVE10", 3)).await.unwrap();
        f.carts.add_item("c1", "a", 2).await.unwrap();
        f.carts.apply_coupon("c1", "SAVE10").await.unwrap();

        f.clock.advance(Duration::days(5));
        assert!(matches!(
            f.checkout.checkout("c1").await,
            Err(EngineError::CouponRejected {
                reason: CouponRejection::Expired { .. },
                ..
            })
        ));
        assert_eq!(
            f.backend.get_by_id(&created.id).await.unwrap().unwrap().used_count,
            0
        );
    }
}
