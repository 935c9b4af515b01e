//! # Validation Module
//!
//! One typed validation pass per operation, run before any shared state is
//! read or written.
//!
//! ```text
//! caller input ──► validate_*() ──► ValidationError (tagged by field)
//!                      │
//!                      └─ OK ──► engine operation touches stores
//! ```
//!
//! ## Usage
//! ```rust
//! use storefront_core::validation::{validate_coupon_code, validate_quantity};
//!
//! validate_quantity(5, 999).unwrap();
//! assert_eq!(validate_coupon_code(" save10 ").unwrap(), "SAVE10");
//! ```

use crate::error::ValidationError;
use crate::MAX_COUPON_CODE_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_ID_LEN: usize = 64;
const MAX_NAME_LEN: usize = 200;
const MAX_REASON_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an entity id (client, product, purchase, refund, coupon id).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 64 characters
/// - No whitespace inside
///
/// ## Returns
/// The trimmed id.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<String> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::required(field));
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    if id.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(id.to_string())
}

/// Validates and normalizes a coupon code.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most `MAX_COUPON_CODE_LEN` characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Returns
/// The trimmed, upper-cased code.
///
/// ## Example
/// ```rust
/// use storefront_core::validation::validate_coupon_code;
///
/// assert_eq!(validate_coupon_code("summer-sale").unwrap(), "SUMMER-SALE");
/// assert!(validate_coupon_code("   ").is_err());
/// assert!(validate_coupon_code("NO SPACES").is_err());
/// ```
pub fn validate_coupon_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::required("coupon code"));
    }

    if code.chars().count() > MAX_COUPON_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "coupon code".to_string(),
            max: MAX_COUPON_CODE_LEN,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "coupon code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(code.to_uppercase())
}

/// Validates a product name.
pub fn validate_product_name(name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required("name"));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(name.to_string())
}

/// Validates a refund reason (required free text).
pub fn validate_refund_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::required("reason"));
    }

    if reason.len() > MAX_REASON_LEN {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LEN,
        });
    }

    Ok(reason.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity to add to a cart.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed `max`, the configured per-line maximum
///
/// The merged line quantity is checked separately against the cart limits.
pub fn validate_quantity(qty: i64, max: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > max {
        return Err(ValidationError::out_of_range("quantity", 1, max));
    }

    Ok(())
}

/// Validates a unit price in minor units. Zero is allowed.
pub fn validate_price(price_minor: i64) -> ValidationResult<()> {
    if price_minor < 0 {
        return Err(ValidationError::out_of_range("price", 0, i64::MAX));
    }
    Ok(())
}

/// Validates an initial stock level.
pub fn validate_stock(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::out_of_range("stock", 0, i64::MAX));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_ITEM_QUANTITY;

    #[test]
    fn test_validate_id() {
        assert_eq!(validate_id("client id", "  c-1 ").unwrap(), "c-1");
        assert!(matches!(
            validate_id("client id", ""),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_id("client id", "a b").is_err());
        assert!(validate_id("client id", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_coupon_code() {
        assert_eq!(validate_coupon_code("save10").unwrap(), "SAVE10");
        assert_eq!(validate_coupon_code(" Black_Friday ").unwrap(), "BLACK_FRIDAY");
        assert!(validate_coupon_code("").is_err());
        assert!(validate_coupon_code("10%OFF").is_err());
        assert!(validate_coupon_code(&"A".repeat(MAX_COUPON_CODE_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1, MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY, MAX_ITEM_QUANTITY).is_ok());
        assert!(matches!(
            validate_quantity(0, MAX_ITEM_QUANTITY),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(validate_quantity(-3, MAX_ITEM_QUANTITY).is_err());
        assert!(matches!(
            validate_quantity(MAX_ITEM_QUANTITY + 1, MAX_ITEM_QUANTITY),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_quantity(1500, 5000).is_ok());
    }

    #[test]
    fn test_validate_money_and_stock() {
        assert!(validate_price(0).is_ok());
        assert!(validate_price(-1).is_err());
        assert!(validate_stock(0).is_ok());
        assert!(validate_stock(-1).is_err());
    }

    #[test]
    fn test_validate_refund_reason() {
        assert_eq!(validate_refund_reason(" damaged ").unwrap(), "damaged");
        assert!(validate_refund_reason("  ").is_err());
    }
}
