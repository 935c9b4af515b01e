//! # Domain Types
//!
//! Core domain types shared by the database layer and the engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Cart       │   │    Purchase     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  client_id (PK) │   │  id (UUID)      │       │
//! │  │  name           │   │  items[]        │   │  lines[] (frozen│       │
//! │  │  price_minor    │   │  coupon_code    │   │  total_paid     │       │
//! │  │  stock (≥ 0)    │   │  totals         │   │  created_at     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                              │
//! │  │  ClientStatus   │   │  RefundStatus   │                              │
//! │  │  Pending        │   │  Pending        │                              │
//! │  │  Active         │   │  Approved       │                              │
//! │  │  Rejected       │   │  Rejected       │                              │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Coupons live in [`crate::coupon`], totals in [`crate::pricing`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::CartTotals;
use crate::validation::{
    validate_id, validate_price, validate_product_name, validate_stock, ValidationResult,
};

// =============================================================================
// Product
// =============================================================================

/// A product as the catalog collaborator reports it.
///
/// The engine only ever changes `stock`, and only through the inventory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Unit price in minor units (never negative).
    pub price_minor: i64,
    /// Units on hand (never negative).
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Builds a catalog entry from unchecked input.
    ///
    /// ## Rules
    /// - id: non-empty, no whitespace
    /// - name: trimmed, non-empty, at most 200 characters
    /// - price and stock: never negative
    pub fn new(
        id: &str,
        name: &str,
        price_minor: i64,
        stock: i64,
        now: DateTime<Utc>,
    ) -> ValidationResult<Product> {
        let id = validate_id("product id", id)?;
        let name = validate_product_name(name)?;
        validate_price(price_minor)?;
        validate_stock(stock)?;

        Ok(Product {
            id,
            name,
            price_minor,
            stock,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns the unit price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_minor(self.price_minor)
    }

    /// Checks whether `quantity` units are on hand right now.
    ///
    /// Advisory only: the answer may be stale by the time it is used.
    pub fn has_stock_for(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }
}

// =============================================================================
// Client
// =============================================================================

/// Account status kept by the client collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// Newly registered, not yet reviewed. May purchase.
    #[default]
    Pending,
    /// Reviewed and approved.
    Active,
    /// Rejected by staff; blocked from purchasing.
    Rejected,
}

impl ClientStatus {
    /// Whether this status forbids checkout.
    pub fn is_blocked(&self) -> bool {
        matches!(self, ClientStatus::Rejected)
    }
}

/// What checkout needs to know about a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    pub exists: bool,
    pub blocked: bool,
}

impl ClientState {
    /// The state reported for an unknown client id.
    pub const UNKNOWN: ClientState = ClientState {
        exists: false,
        blocked: false,
    };

    /// Derives the state from a status lookup (`None` = no such client).
    pub fn from_status(status: Option<ClientStatus>) -> Self {
        match status {
            Some(status) => ClientState {
                exists: true,
                blocked: status.is_blocked(),
            },
            None => ClientState::UNKNOWN,
        }
    }
}

// =============================================================================
// Cart
// =============================================================================

/// One line of a cart. Owned by its cart; has no lifecycle of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    /// Always ≥ 1.
    pub quantity: i64,
}

/// Size limits applied when merging lines into a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLimits {
    pub max_lines: usize,
    pub max_item_quantity: i64,
}

impl Default for CartLimits {
    fn default() -> Self {
        CartLimits {
            max_lines: crate::MAX_CART_LINES,
            max_item_quantity: crate::MAX_ITEM_QUANTITY,
        }
    }
}

/// A client's cart.
///
/// ## Invariants
/// - Lines are unique by `product_id` and keep insertion order
/// - Every line quantity is ≥ 1
/// - `0 ≤ discount_minor ≤ total_minor`
/// - `total_with_discount_minor == total_minor - discount_minor`
/// - No coupon ⇒ `discount_minor == 0`
///
/// Totals are written only through [`Cart::apply_totals`], which the cart
/// store calls after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub client_id: String,
    pub items: Vec<CartItem>,
    pub total_minor: i64,
    pub coupon_code: Option<String>,
    pub discount_minor: i64,
    pub total_with_discount_minor: i64,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates an empty cart for a client.
    pub fn new(client_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Cart {
            client_id: client_id.into(),
            items: Vec::new(),
            total_minor: 0,
            coupon_code: None,
            discount_minor: 0,
            total_with_discount_minor: 0,
            updated_at: now,
        }
    }

    /// Checks if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Quantity already in the cart for a product (0 when absent).
    pub fn quantity_of(&self, product_id: &str) -> i64 {
        self.items
            .iter()
            .find(|i| i.product_id == product_id)
            .map_or(0, |i| i.quantity)
    }

    /// Computes the quantity a line would hold after adding `quantity`,
    /// without changing the cart.
    ///
    /// ## Errors
    /// - `QuantityTooLarge` when the merged quantity passes the line maximum
    /// - `CartTooLarge` when a new line would exceed the line count maximum
    pub fn merged_quantity(
        &self,
        product_id: &str,
        quantity: i64,
        limits: CartLimits,
    ) -> CoreResult<i64> {
        let existing = self.quantity_of(product_id);
        let merged = existing + quantity;

        if merged > limits.max_item_quantity {
            return Err(CoreError::QuantityTooLarge {
                requested: merged,
                max: limits.max_item_quantity,
            });
        }

        if existing == 0 && self.items.len() >= limits.max_lines {
            return Err(CoreError::CartTooLarge {
                max: limits.max_lines,
            });
        }

        Ok(merged)
    }

    /// Adds a product or increases the quantity of its existing line.
    ///
    /// Returns the line's new quantity.
    pub fn merge_item(
        &mut self,
        product_id: &str,
        quantity: i64,
        limits: CartLimits,
    ) -> CoreResult<i64> {
        let merged = self.merged_quantity(product_id, quantity, limits)?;

        match self.items.iter_mut().find(|i| i.product_id == product_id) {
            Some(item) => item.quantity = merged,
            None => self.items.push(CartItem {
                product_id: product_id.to_string(),
                quantity: merged,
            }),
        }

        Ok(merged)
    }

    /// Writes freshly computed totals into the cart.
    pub fn apply_totals(&mut self, totals: CartTotals, now: DateTime<Utc>) {
        self.total_minor = totals.total.minor();
        self.discount_minor = totals.discount.minor();
        self.total_with_discount_minor = totals.total_with_discount.minor();
        self.updated_at = now;
    }

    /// Drops the applied coupon and resets the discount.
    pub fn detach_coupon(&mut self, now: DateTime<Utc>) {
        self.coupon_code = None;
        self.discount_minor = 0;
        self.total_with_discount_minor = self.total_minor;
        self.updated_at = now;
    }

    /// Empties the cart after a successful checkout.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.coupon_code = None;
        self.total_minor = 0;
        self.discount_minor = 0;
        self.total_with_discount_minor = 0;
        self.updated_at = now;
    }

    /// Total before discount as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_minor(self.total_minor)
    }

    /// Total after discount as Money.
    #[inline]
    pub fn total_with_discount(&self) -> Money {
        Money::from_minor(self.total_with_discount_minor)
    }
}

// =============================================================================
// Purchase
// =============================================================================

/// A purchased line, frozen at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: String,
    pub quantity: i64,
    /// Unit price in effect when the purchase was committed.
    pub unit_price_minor: i64,
}

/// Immutable record of a completed checkout.
///
/// Uses the snapshot pattern: nothing here refers back to mutable catalog or
/// cart state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub id: String,
    pub client_id: String,
    pub items: Vec<PurchaseLine>,
    /// Sum of line totals before discount.
    pub total_minor: i64,
    pub discount_minor: i64,
    pub coupon_code: Option<String>,
    /// `total_minor - discount_minor`.
    pub total_paid_minor: i64,
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    /// Returns the amount paid as Money.
    #[inline]
    pub fn total_paid(&self) -> Money {
        Money::from_minor(self.total_paid_minor)
    }
}

// =============================================================================
// Refund
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RefundStatus {
    /// Validates a status change. Only `Pending → Approved | Rejected`.
    pub fn transition(self, to: RefundStatus) -> CoreResult<RefundStatus> {
        match (self, to) {
            (RefundStatus::Pending, RefundStatus::Approved)
            | (RefundStatus::Pending, RefundStatus::Rejected) => Ok(to),
            (from, to) => Err(CoreError::IllegalRefundTransition { from, to }),
        }
    }
}

/// A client's request to refund a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Refund {
    pub id: String,
    pub purchase_id: String,
    pub reason: String,
    pub status: RefundStatus,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
