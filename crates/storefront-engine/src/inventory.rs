//! # Inventory Store
//!
//! Authoritative stock counters with per-product serialization.
//!
//! ## Reserve = check + decrement, atomically
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  check_and_reserve("sku-1", 2)                                          │
//! │                                                                         │
//! │   lock("sku-1")                     ◄── other reservations of sku-1 wait │
//! │     stock = catalog.get_product()                                       │
//! │     stock < 2? ──► { ok: false, available: stock }                      │
//! │     catalog.update_stock(-2)        ◄── guarded: refuses to go negative │
//! │   unlock                                                                │
//! │                                                                         │
//! │   ──► { ok: true, available: stock - 2 }                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The lock keeps this process from acting on a stale read; the guarded
//! `update_stock` keeps other processes sharing the same database honest.
//! Reserving is also the commit: there is no held-but-unsold state.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use storefront_core::Product;

use crate::error::{EngineError, EngineResult};
use crate::locks::KeyedLocks;
use crate::store::{Catalog, StoreError};

/// Outcome of a reservation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockCheck {
    pub ok: bool,
    /// Stock after the reservation when `ok`, current stock otherwise.
    pub available: i64,
}

pub struct InventoryStore {
    catalog: Arc<dyn Catalog>,
    locks: KeyedLocks,
}

impl InventoryStore {
    pub fn new(catalog: Arc<dyn Catalog>, prune_threshold: usize) -> Self {
        InventoryStore {
            catalog,
            locks: KeyedLocks::new("product", prune_threshold),
        }
    }

    /// Reads a product. `ProductNotFound` if the catalog does not know it.
    pub async fn product(&self, product_id: &str) -> EngineResult<Product> {
        self.catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| EngineError::ProductNotFound {
                product_id: product_id.to_string(),
            })
    }

    /// Non-committing stock read. Advisory only.
    pub async fn available(&self, product_id: &str) -> EngineResult<i64> {
        Ok(self.product(product_id).await?.stock)
    }

    /// Atomically checks for `quantity` units and takes them.
    ///
    /// Insufficient stock is a normal outcome (`ok: false`), not an error.
    pub async fn check_and_reserve(&self, product_id: &str, quantity: i64) -> EngineResult<StockCheck> {
        let _guard = self.locks.lock(product_id).await;

        let stock = self.available(product_id).await?;
        if stock < quantity {
            debug!(product_id, stock, quantity, "Reservation refused");
            return Ok(StockCheck {
                ok: false,
                available: stock,
            });
        }

        match self.catalog.update_stock(product_id, -quantity).await {
            Ok(remaining) => {
                debug!(product_id, quantity, remaining, "Stock reserved");
                Ok(StockCheck {
                    ok: true,
                    available: remaining,
                })
            }
            // Another writer on the same database got there first
            Err(StoreError::Conflict(reason)) => {
                warn!(product_id, quantity, %reason, "Stock changed outside this process");
                Ok(StockCheck {
                    ok: false,
                    available: self.available(product_id).await?,
                })
            }
            Err(StoreError::NotFound { .. }) => Err(EngineError::ProductNotFound {
                product_id: product_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Compensating increment for an earlier reservation.
    pub async fn release(&self, product_id: &str, quantity: i64) -> EngineResult<i64> {
        let _guard = self.locks.lock(product_id).await;

        let stock = self.catalog.update_stock(product_id, quantity).await?;
        debug!(product_id, quantity, stock, "Stock released");
        Ok(stock)
    }
}

// =============================================================================
// Reservation Set
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetState {
    Open,
    Committed,
    Released,
}

/// Reservations taken by one checkout.
///
/// Ends exactly one way: `commit` (the sale stands) or `release_all` (every
/// unit goes back). Crossing the two is a programming error and panics.
#[derive(Debug)]
pub struct ReservationSet {
    held: Vec<Reservation>,
    state: SetState,
}

impl Default for ReservationSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservationSet {
    pub fn new() -> Self {
        ReservationSet {
            held: Vec::new(),
            state: SetState::Open,
        }
    }

    pub fn push(&mut self, product_id: &str, quantity: i64) {
        assert_eq!(
            self.state,
            SetState::Open,
            "reservation added to a closed set"
        );
        self.held.push(Reservation {
            product_id: product_id.to_string(),
            quantity,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.held
    }

    pub fn commit(&mut self) {
        assert_ne!(
            self.state,
            SetState::Released,
            "commit attempted after compensating release"
        );
        self.state = SetState::Committed;
    }

    /// Returns every reserved unit, newest first.
    ///
    /// Keeps going past individual failures so as much stock as possible is
    /// restored, then reports whatever could not be released.
    pub async fn release_all(
        &mut self,
        inventory: &InventoryStore,
        cause: &EngineError,
    ) -> EngineResult<()> {
        assert_ne!(
            self.state,
            SetState::Committed,
            "release attempted after commit"
        );
        self.state = SetState::Released;

        let mut unreleased = Vec::new();
        for r in self.held.iter().rev() {
            if let Err(e) = inventory.release(&r.product_id, r.quantity).await {
                error!(
                    product_id = %r.product_id,
                    quantity = r.quantity,
                    error = %e,
                    "Compensating release failed"
                );
                unreleased.push((r.product_id.clone(), r.quantity));
            }
        }

        if unreleased.is_empty() {
            Ok(())
        } else {
            Err(EngineError::CompensationFailed {
                cause: cause.to_string(),
                unreleased,
            })
        }
    }
}
