//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Storage, lock conflicts, wraps CoreError       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → request layer           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error aborts the whole unit of work. None of them leave stock,
//! line items or ledger fields partially updated.

use thiserror::Error;

use crate::ledger::LedgerAccount;
use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A deposit would drive a ledger account below zero.
    ///
    /// The ledger row is left untouched; there is no partial application.
    #[error("Deposit of {amount} to {account} would make the balance negative (current {current})")]
    NegativeBalance {
        account: LedgerAccount,
        current: Money,
        amount: Money,
    },

    /// A stock adjustment would drive a product's stock below zero.
    ///
    /// ## User Workflow
    /// ```text
    /// Create order (qty: 5)
    ///      │
    ///      ▼
    /// Lock product, read stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// Whole order rolled back, nothing committed
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// A referenced product, order, line item or customer does not exist.
    #[error("{entity} not found: {id}")]
    UnknownEntity { entity: String, id: String },

    /// The order cannot be created as requested.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// The requested operation is not allowed in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The same existing line item was referenced twice in one update.
    #[error("Line item {item_id} appears more than once in the request")]
    DuplicateItem { item_id: String },

    /// A computed amount or count left the representable range.
    ///
    /// Raised instead of wrapping; nothing is written.
    #[error("{what} is out of range")]
    Overflow { what: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an UnknownEntity error for a given entity type and ID.
    pub fn unknown(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::UnknownEntity {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn overflow(what: impl Into<String>) -> Self {
        CoreError::Overflow { what: what.into() }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Checked before any lock is taken or row is read.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Collection has too many entries.
    #[error("{field} cannot have more than {max} entries")]
    TooMany { field: String, max: usize },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p-1".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for product p-1: available 3, requested 5"
        );

        let err = CoreError::NegativeBalance {
            account: LedgerAccount::PaidAmount,
            current: Money::zero(),
            amount: Money::from_cents(-500),
        };
        assert_eq!(
            err.to_string(),
            "Deposit of -5.00 to paid_amount would make the balance negative (current 0.00)"
        );
    }

    #[test]
    fn test_unknown_helper() {
        let err = CoreError::unknown("Order", "o-9");
        assert_eq!(err.to_string(), "Order not found: o-9");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
