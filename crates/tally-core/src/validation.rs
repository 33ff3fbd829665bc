//! # Validation Module
//!
//! Input rules checked before any lock is taken.
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_quantity, validate_deposit_amount};
//! use tally_core::Money;
//!
//! validate_quantity(5).unwrap();
//! assert!(validate_deposit_amount(Money::zero()).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::ItemRequest;
use crate::{
    MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY, MAX_NOTE_LENGTH, MAX_ORDER_ITEMS, MAX_PRICE_CENTS,
    MAX_STOCK,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (product or customer).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 255 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 255 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 255,
        });
    }

    Ok(())
}

/// Validates a SKU.
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    Ok(())
}

/// Validates a balance note. Empty notes are allowed; a default is written.
pub fn validate_note(note: &str) -> ValidationResult<()> {
    if note.chars().count() > MAX_NOTE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: MAX_NOTE_LENGTH,
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line item quantity: 1..=MAX_ITEM_QUANTITY.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a product price: 0..=MAX_PRICE_CENTS. Free products are allowed.
pub fn validate_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() || price.cents() > MAX_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }
    Ok(())
}

/// Validates a product's opening stock: 0..=MAX_STOCK.
pub fn validate_opening_stock(stock: i64) -> ValidationResult<()> {
    if !(0..=MAX_STOCK).contains(&stock) {
        return Err(ValidationError::OutOfRange {
            field: "stock".to_string(),
            min: 0,
            max: MAX_STOCK,
        });
    }
    Ok(())
}

/// Validates a restock quantity: 1..=MAX_STOCK.
pub fn validate_restock(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "restock quantity".to_string(),
        });
    }

    if quantity > MAX_STOCK {
        return Err(ValidationError::OutOfRange {
            field: "restock quantity".to_string(),
            min: 1,
            max: MAX_STOCK,
        });
    }

    Ok(())
}

/// Validates an external deposit. Either sign is allowed; zero is not,
/// and the magnitude is capped at MAX_AMOUNT_CENTS.
pub fn validate_deposit_amount(amount: Money) -> ValidationResult<()> {
    if amount.is_zero() {
        return Err(ValidationError::MustBeNonZero {
            field: "amount".to_string(),
        });
    }
    validate_amount_bound("amount", amount)
}

/// Validates an order supplement. Either sign and zero are allowed.
pub fn validate_supplement(supplement: Money) -> ValidationResult<()> {
    validate_amount_bound("supplement", supplement)
}

fn validate_amount_bound(field: &str, amount: Money) -> ValidationResult<()> {
    // i64::MIN has no absolute value, so compare each side directly
    if !(-MAX_AMOUNT_CENTS..=MAX_AMOUNT_CENTS).contains(&amount.cents()) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: -MAX_AMOUNT_CENTS,
            max: MAX_AMOUNT_CENTS,
        });
    }
    Ok(())
}

// =============================================================================
// Order Validators
// =============================================================================

/// Validates the item set of a new order.
///
/// ## Rules
/// - At least one item
/// - Everything `validate_target_items` checks
pub fn validate_new_items(items: &[ItemRequest]) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }
    validate_target_items(items)
}

/// Validates the target item set of an update.
///
/// An empty target is allowed: it removes every line and returns all stock.
///
/// ## Rules
/// - At most MAX_ORDER_ITEMS
/// - Every product id present
/// - Every quantity valid
pub fn validate_target_items(items: &[ItemRequest]) -> ValidationResult<()> {
    if items.len() > MAX_ORDER_ITEMS {
        return Err(ValidationError::TooMany {
            field: "items".to_string(),
            max: MAX_ORDER_ITEMS,
        });
    }

    for item in items {
        if item.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "product_id".to_string(),
            });
        }
        validate_quantity(item.quantity)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_items() {
        assert!(validate_new_items(&[ItemRequest::new("p-1", 2)]).is_ok());
        assert!(validate_new_items(&[]).is_err());
        assert!(validate_new_items(&[ItemRequest::new("  ", 2)]).is_err());
        assert!(validate_new_items(&[ItemRequest::new("p-1", 0)]).is_err());

        let too_many: Vec<ItemRequest> = (0..=MAX_ORDER_ITEMS)
            .map(|i| ItemRequest::new(format!("p-{i}"), 1))
            .collect();
        assert!(matches!(
            validate_new_items(&too_many),
            Err(ValidationError::TooMany { .. })
        ));
        assert!(validate_target_items(&too_many).is_err());
    }

    #[test]
    fn test_update_target_may_be_empty() {
        assert!(validate_target_items(&[]).is_ok());
        assert!(validate_target_items(&[ItemRequest::new("p-1", 0)]).is_err());
    }

    #[test]
    fn test_validate_deposit_amount() {
        assert!(validate_deposit_amount(Money::from_cents(2500)).is_ok());
        assert!(validate_deposit_amount(Money::from_cents(-500)).is_ok());
        assert!(validate_deposit_amount(Money::zero()).is_err());
        assert!(validate_deposit_amount(Money::from_cents(MAX_AMOUNT_CENTS)).is_ok());
        assert!(validate_deposit_amount(Money::from_cents(-MAX_AMOUNT_CENTS)).is_ok());
        assert!(validate_deposit_amount(Money::from_cents(i64::MAX)).is_err());
        assert!(validate_deposit_amount(Money::from_cents(i64::MIN)).is_err());
    }

    #[test]
    fn test_price_stock_and_supplement_limits() {
        assert!(validate_price(Money::zero()).is_ok());
        assert!(validate_price(Money::from_cents(MAX_PRICE_CENTS)).is_ok());
        assert!(validate_price(Money::from_cents(MAX_PRICE_CENTS + 1)).is_err());

        assert!(validate_opening_stock(0).is_ok());
        assert!(validate_opening_stock(-1).is_err());
        assert!(validate_opening_stock(MAX_STOCK + 1).is_err());

        assert!(validate_restock(MAX_STOCK).is_ok());
        assert!(validate_restock(0).is_err());
        assert!(matches!(
            validate_restock(i64::MAX),
            Err(ValidationError::OutOfRange { .. })
        ));

        assert!(validate_supplement(Money::zero()).is_ok());
        assert!(validate_supplement(Money::from_cents(-1000)).is_ok());
        assert!(validate_supplement(Money::from_cents(i64::MIN)).is_err());
    }

    #[test]
    fn test_validate_note_and_names() {
        assert!(validate_note("").is_ok());
        assert!(validate_note(&"x".repeat(MAX_NOTE_LENGTH + 1)).is_err());
        assert!(validate_name("name", "Ada").is_ok());
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_sku("WIDGET-1").is_ok());
        assert!(validate_sku(&"A".repeat(51)).is_err());
        assert!(validate_price(Money::from_cents(-1)).is_err());
    }
}
