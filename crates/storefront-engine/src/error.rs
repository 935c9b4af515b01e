//! # Engine Errors
//!
//! The single error type callers of the engine see.
//!
//! ## Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ErrorKind       Variants                         Caller reaction       │
//! │  ─────────────   ──────────────────────────────   ───────────────────   │
//! │  Validation      Validation                       fix the input         │
//! │  BusinessRule    InsufficientStock, EmptyCart,    show the reason,      │
//! │                  ClientBlocked, CouponRejected,   adjust and resubmit   │
//! │                  CouponExhausted, ...                                   │
//! │  Transient       Unavailable                      retry later           │
//! │  Internal        CompensationFailed, Store        alert an operator     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine never retries on its own; `is_transient()` tells the caller
//! whether a retry can help.

use thiserror::Error;

use storefront_core::{CoreError, CouponRejection, ValidationError};

use crate::store::StoreError;

/// Coarse error category for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape, rejected before any state was touched.
    Validation,
    /// A recoverable domain rule said no.
    BusinessRule,
    /// A backing store is unavailable; retrying may succeed.
    Transient,
    /// Something that should not happen.
    Internal,
}

/// Errors returned by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Pure domain rule from storefront-core (cart limits, refund transitions).
    #[error("{0}")]
    Core(CoreError),

    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: String },

    #[error("Insufficient stock for {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    #[error("Cart for {client_id} is empty")]
    EmptyCart { client_id: String },

    #[error("Client not found: {client_id}")]
    ClientNotFound { client_id: String },

    #[error("Client {client_id} is blocked from purchasing")]
    ClientBlocked { client_id: String },

    #[error("Coupon {applied} is already applied; remove it first")]
    ConflictingCoupon { applied: String },

    #[error("No coupon applied to the cart of {client_id}")]
    NoCouponApplied { client_id: String },

    #[error("Coupon not found: {0}")]
    CouponNotFound(String),

    #[error("Coupon {code} rejected: {reason}")]
    CouponRejected {
        code: String,
        reason: CouponRejection,
    },

    #[error("Coupon {code} has no uses left")]
    CouponExhausted { code: String },

    #[error("Coupon code already exists: {code}")]
    DuplicateCoupon { code: String },

    #[error("Purchase not found: {0}")]
    PurchaseNotFound(String),

    #[error("Refund not found: {0}")]
    RefundNotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A failed checkout could not put all reserved stock back.
    #[error("Compensation failed after '{cause}'; unreleased: {unreleased:?}")]
    CompensationFailed {
        cause: String,
        unreleased: Vec<(String, i64)>,
    },

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Core(CoreError::Validation(_)) => ErrorKind::Validation,
            EngineError::Unavailable(_) => ErrorKind::Transient,
            EngineError::CompensationFailed { .. } | EngineError::Store(_) => ErrorKind::Internal,
            _ => ErrorKind::BusinessRule,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Turns a coupon rejection into the matching engine error.
    pub(crate) fn coupon(code: &str, reason: CouponRejection) -> Self {
        match reason {
            CouponRejection::Exhausted => EngineError::CouponExhausted {
                code: code.to_string(),
            },
            reason => EngineError::CouponRejected {
                code: code.to_string(),
                reason,
            },
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => EngineError::Validation(v),
            other => EngineError::Core(other),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => EngineError::Unavailable(msg),
            other => EngineError::Store(other),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            EngineError::from(ValidationError::MustBePositive {
                field: "quantity".into()
            })
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::EmptyCart {
                client_id: "c1".into()
            }
            .kind(),
            ErrorKind::BusinessRule
        );
        assert!(EngineError::from(StoreError::Unavailable("down".into())).is_transient());
        assert_eq!(
            EngineError::from(StoreError::Backend("boom".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_core_validation_unwraps() {
        let err = EngineError::from(CoreError::Validation(ValidationError::Required {
            field: "code".into(),
        }));
        assert!(matches!(err, EngineError::Validation(_)));

        let err = EngineError::from(CoreError::CartTooLarge { max: 100 });
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
    }

    #[test]
    fn test_exhausted_rejection_maps_to_exhausted() {
        assert_eq!(
            EngineError::coupon("SAVE10", CouponRejection::Exhausted),
            EngineError::CouponExhausted {
                code: "SAVE10".into()
            }
        );
        assert!(matches!(
            EngineError::coupon("SAVE10", CouponRejection::Inactive),
            EngineError::CouponRejected { .. }
        ));
    }

    #[test]
    fn test_insufficient_stock_message() {
        let err = EngineError::InsufficientStock {
            product_id: "p1".into(),
            available: 1,
            requested: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for p1: 1 available, 3 requested"
        );
    }
}
