//! # Repository Module
//!
//! One repository per table group. Each holds a pool handle and is cheap to
//! clone; obtain them from [`crate::Database`].
//!
//! ```text
//! Database
//! ├── products()   ProductRepository   catalog + guarded stock delta
//! ├── clients()    ClientRepository    account status
//! ├── carts()      CartRepository      carts + cart_items
//! ├── coupons()    CouponRepository    definitions + guarded redemption
//! ├── purchases()  PurchaseRepository  append-only history
//! └── refunds()    RefundRepository    refund requests
//! ```
//!
//! Repositories run SQL and nothing else. Locking and business rules belong
//! to the engine.

pub mod cart;
pub mod client;
pub mod coupon;
pub mod product;
pub mod purchase;
pub mod refund;
