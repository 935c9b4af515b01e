//! # storefront-engine: Cart / Inventory / Coupon Consistency Engine
//!
//! Guarantees that a checkout never oversells stock, never over-redeems a
//! coupon, and leaves everything as it was when it fails, even with many
//! clients buying the same products at once.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Callers (HTTP, GraphQL, CLI ...)                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                storefront-engine (THIS CRATE)                   │   │
//! │  │                                                                 │   │
//! │  │   Engine ──► CartStore ──► InventoryStore ──► Catalog           │   │
//! │  │     │            │     └─► CouponLedger ───► CouponRepository   │   │
//! │  │     └──► CheckoutOrchestrator (state machine + compensation)    │   │
//! │  │     └──► RefundDesk                                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                    │                            │
//! │       ▼                                    ▼                            │
//! │  backend::memory                     backend::sqlite ──► storefront-db │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Locking
//! - one async mutex per client: cart edits and checkout of a client queue up
//! - one async mutex per product: check-and-decrement of its stock
//! - one async mutex per coupon code: redemption
//!
//! A checkout holds its client's lock throughout and takes product locks one
//! at a time in product id order.
//!
//! ## Usage
//! ```rust,ignore
//! use storefront_engine::{Engine, EngineConfig};
//!
//! let (engine, _backend) = Engine::open_sqlite(&EngineConfig::from_env()?).await?;
//! engine.add_item("client-1", "sku-1", 2).await?;
//! let purchase = engine.checkout("client-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backend;
pub mod cart;
pub mod checkout;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod locks;
pub mod refund;
pub mod store;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{MemoryBackend, SqliteBackend};
pub use checkout::{CheckoutFlow, CheckoutState};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use inventory::StockCheck;
pub use store::{StoreError, StoreResult, Stores};
