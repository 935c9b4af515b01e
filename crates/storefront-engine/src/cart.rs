//! # Cart Store
//!
//! Per-client carts. Every mutation runs under the client's lock and ends
//! with a recompute against current catalog prices.
//!
//! ## Soft vs. Hard Coupon Checks
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_item / remove_coupon  (incidental recompute)                       │
//! │     coupon still valid?  yes ──► new discount                           │
//! │                          no  ──► coupon detached, warn!, Ok(cart)        │
//! │                                                                         │
//! │  apply_coupon  (explicit action)                                        │
//! │     coupon valid?        yes ──► attached (NOT redeemed)                │
//! │                          no  ──► Err(CouponRejected / CouponExhausted)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock checks here are advisory reads. Nothing is reserved until checkout.

use std::sync::Arc;

use tracing::{debug, info, warn};

use storefront_core::pricing::quote;
use storefront_core::validation::{validate_coupon_code, validate_id, validate_quantity};
use storefront_core::{Cart, CartLimits, CouponOutcome, CouponRejection, PricedLine};

use crate::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::inventory::InventoryStore;
use crate::ledger::CouponLedger;
use crate::locks::{KeyGuard, KeyedLocks};
use crate::store::CartRepository;

pub struct CartStore {
    carts: Arc<dyn CartRepository>,
    inventory: Arc<InventoryStore>,
    ledger: Arc<CouponLedger>,
    client_locks: KeyedLocks,
    clock: Arc<dyn Clock>,
    limits: CartLimits,
}

impl CartStore {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        inventory: Arc<InventoryStore>,
        ledger: Arc<CouponLedger>,
        clock: Arc<dyn Clock>,
        limits: CartLimits,
        prune_threshold: usize,
    ) -> Self {
        CartStore {
            carts,
            inventory,
            ledger,
            client_locks: KeyedLocks::new("client", prune_threshold),
            clock,
            limits,
        }
    }

    // =========================================================================
    // Caller Operations
    // =========================================================================

    /// Returns the client's cart, creating and storing an empty one if absent.
    pub async fn create_cart(&self, client_id: &str) -> EngineResult<Cart> {
        let client_id = validate_id("client id", client_id)?;
        let _guard = self.lock_client(&client_id).await;

        if let Some(cart) = self.carts.load(&client_id).await? {
            return Ok(cart);
        }

        let cart = Cart::new(&client_id, self.clock.now());
        self.carts.save(&cart).await?;
        debug!(client_id = %client_id, "Cart created");
        Ok(cart)
    }

    /// Adds `quantity` units of a product, merging with an existing line.
    ///
    /// ## Errors
    /// - `Validation` for a bad id or a quantity < 1
    /// - `ProductNotFound`
    /// - `InsufficientStock` when the merged quantity exceeds current stock
    /// - `Core(QuantityTooLarge | CartTooLarge)` past the cart limits
    pub async fn add_item(&self, client_id: &str, product_id: &str, quantity: i64) -> EngineResult<Cart> {
        let client_id = validate_id("client id", client_id)?;
        let product_id = validate_id("product id", product_id)?;
        validate_quantity(quantity, self.limits.max_item_quantity)?;

        let _guard = self.lock_client(&client_id).await;
        let mut cart = self.load_or_new(&client_id).await?;

        let product = self.inventory.product(&product_id).await?;
        let merged = cart.merged_quantity(&product_id, quantity, self.limits)?;
        if !product.has_stock_for(merged) {
            return Err(EngineError::InsufficientStock {
                product_id,
                available: product.stock,
                requested: merged,
            });
        }

        cart.merge_item(&product_id, quantity, self.limits)?;
        self.recompute(&mut cart).await?;
        self.carts.save(&cart).await?;

        debug!(
            client_id = %client_id,
            product_id = %product_id,
            quantity = merged,
            total = cart.total_minor,
            "Item added to cart"
        );
        Ok(cart)
    }

    /// Attaches a coupon after full validation. Does not consume a use.
    pub async fn apply_coupon(&self, client_id: &str, code: &str) -> EngineResult<Cart> {
        let client_id = validate_id("client id", client_id)?;
        let code = validate_coupon_code(code)?;

        let _guard = self.lock_client(&client_id).await;
        let mut cart = self.load_or_new(&client_id).await?;

        if let Some(applied) = &cart.coupon_code {
            return Err(EngineError::ConflictingCoupon {
                applied: applied.clone(),
            });
        }

        let coupon = self
            .ledger
            .find(&code)
            .await?
            .ok_or_else(|| EngineError::coupon(&code, CouponRejection::NotFound))?;

        let now = self.clock.now();
        let lines = self.priced_lines(&cart).await?;
        let priced = quote(&lines, Some(&coupon), now)?;

        if let CouponOutcome::Rejected(reason) = priced.coupon {
            debug!(client_id = %client_id, code = %code, %reason, "Coupon refused");
            return Err(EngineError::coupon(&code, reason));
        }

        cart.coupon_code = Some(coupon.code);
        cart.apply_totals(priced.totals, now);
        self.carts.save(&cart).await?;

        info!(
            client_id = %client_id,
            code = %code,
            discount = cart.discount_minor,
            "Coupon applied to cart"
        );
        Ok(cart)
    }

    pub async fn remove_coupon(&self, client_id: &str) -> EngineResult<Cart> {
        let client_id = validate_id("client id", client_id)?;
        let _guard = self.lock_client(&client_id).await;

        let mut cart = match self.carts.load(&client_id).await? {
            Some(cart) if cart.coupon_code.is_some() => cart,
            _ => return Err(EngineError::NoCouponApplied { client_id }),
        };

        cart.detach_coupon(self.clock.now());
        self.recompute(&mut cart).await?;
        self.carts.save(&cart).await?;

        debug!(client_id = %client_id, "Coupon removed from cart");
        Ok(cart)
    }

    /// Current cart as stored. A client without one gets an empty,
    /// unsaved cart.
    pub async fn get_cart(&self, client_id: &str) -> EngineResult<Cart> {
        let client_id = validate_id("client id", client_id)?;
        self.load_or_new(&client_id).await
    }

    // =========================================================================
    // Shared with checkout
    // =========================================================================

    pub(crate) async fn lock_client(&self, client_id: &str) -> KeyGuard {
        self.client_locks.lock(client_id).await
    }

    pub(crate) async fn load(&self, client_id: &str) -> EngineResult<Option<Cart>> {
        Ok(self.carts.load(client_id).await?)
    }

    pub(crate) async fn save(&self, cart: &Cart) -> EngineResult<()> {
        Ok(self.carts.save(cart).await?)
    }

    /// Joins each line with the product's current price.
    pub(crate) async fn priced_lines(&self, cart: &Cart) -> EngineResult<Vec<PricedLine>> {
        let mut lines = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            let product = self.inventory.product(&item.product_id).await?;
            lines.push(PricedLine {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price: product.price(),
            });
        }
        Ok(lines)
    }

    async fn load_or_new(&self, client_id: &str) -> EngineResult<Cart> {
        Ok(self
            .carts
            .load(client_id)
            .await?
            .unwrap_or_else(|| Cart::new(client_id, self.clock.now())))
    }

    /// Reprices the cart and soft-checks its coupon.
    async fn recompute(&self, cart: &mut Cart) -> EngineResult<()> {
        let now = self.clock.now();
        let lines = self.priced_lines(cart).await?;
        let coupon = match &cart.coupon_code {
            Some(code) => self.ledger.find(code).await?,
            None => None,
        };

        let priced = quote(&lines, coupon.as_ref(), now)?;
        let rejection = match (&cart.coupon_code, priced.coupon) {
            // Deleted since it was applied
            (Some(_), CouponOutcome::NotApplied) => Some(CouponRejection::NotFound),
            (_, CouponOutcome::Rejected(reason)) => Some(reason),
            _ => None,
        };

        if let Some(reason) = rejection {
            warn!(
                client_id = %cart.client_id,
                code = ?cart.coupon_code,
                %reason,
                "Coupon no longer applies; detached from cart"
            );
            cart.coupon_code = None;
        }

        cart.apply_totals(priced.totals, now);
        Ok(())
    }
}
