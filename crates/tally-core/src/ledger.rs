//! # Ledger
//!
//! Per-customer running balance with two named accounts.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Ledger (1 per customer)                       │
//! │                                                                         │
//! │   orders_total  ── Σ committed order deltas (payable amounts)           │
//! │   paid_amount   ── Σ payments recorded from outside                     │
//! │                                                                         │
//! │   amount_to_pay = orders_total − paid_amount                           │
//! │                                                                         │
//! │   Rule: a deposit that would leave EITHER account below zero is        │
//! │         rejected in full. Nothing is partially applied.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This module only holds the arithmetic. Serializing deposits per customer
//! is the job of the lock manager in `tally-db`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;

// =============================================================================
// Ledger Account
// =============================================================================

/// One of the two ledger accounts a deposit can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LedgerAccount {
    /// Cumulative signed total of all committed order deltas.
    OrdersTotal,
    /// Cumulative payments.
    PaidAmount,
}

impl fmt::Display for LedgerAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerAccount::OrdersTotal => write!(f, "orders_total"),
            LedgerAccount::PaidAmount => write!(f, "paid_amount"),
        }
    }
}

impl FromStr for LedgerAccount {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orders_total" => Ok(LedgerAccount::OrdersTotal),
            "paid_amount" => Ok(LedgerAccount::PaidAmount),
            _ => Err(ValidationError::NotAllowed {
                field: "account".to_string(),
                allowed: vec!["orders_total".to_string(), "paid_amount".to_string()],
            }),
        }
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Snapshot of one customer's ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Ledger {
    pub customer_id: String,
    pub orders_total_cents: i64,
    pub paid_amount_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl Ledger {
    /// A freshly provisioned ledger with both accounts at zero.
    pub fn empty(customer_id: impl Into<String>) -> Self {
        Ledger {
            customer_id: customer_id.into(),
            orders_total_cents: 0,
            paid_amount_cents: 0,
            updated_at: Utc::now(),
        }
    }

    #[inline]
    pub fn orders_total(&self) -> Money {
        Money::from_cents(self.orders_total_cents)
    }

    #[inline]
    pub fn paid_amount(&self) -> Money {
        Money::from_cents(self.paid_amount_cents)
    }

    /// Current value of one account.
    pub fn balance(&self, account: LedgerAccount) -> Money {
        match account {
            LedgerAccount::OrdersTotal => self.orders_total(),
            LedgerAccount::PaidAmount => self.paid_amount(),
        }
    }

    /// `orders_total − paid_amount`. Negative means the customer is in credit.
    #[inline]
    pub fn amount_to_pay(&self) -> Money {
        self.orders_total() - self.paid_amount()
    }

    /// Applies a signed deposit to one account.
    ///
    /// ## Returns
    /// * `Ok(Ledger)` - The new snapshot; `self` is unchanged
    /// * `Err(CoreError::NegativeBalance)` - `current + amount < 0`
    /// * `Err(CoreError::Overflow)` - `current + amount` leaves `i64` cents
    pub fn apply(&self, account: LedgerAccount, amount: Money) -> CoreResult<Ledger> {
        let current = self.balance(account);
        let next = current
            .checked_add(amount)
            .ok_or_else(|| CoreError::overflow(format!("{account} balance")))?;

        if next.is_negative() {
            return Err(CoreError::NegativeBalance {
                account,
                current,
                amount,
            });
        }

        let mut updated = self.clone();
        match account {
            LedgerAccount::OrdersTotal => updated.orders_total_cents = next.cents(),
            LedgerAccount::PaidAmount => updated.paid_amount_cents = next.cents(),
        }
        Ok(updated)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paying_off_orders() {
        let ledger = Ledger::empty("c-1")
            .apply(LedgerAccount::OrdersTotal, Money::from_cents(2500))
            .unwrap()
            .apply(LedgerAccount::PaidAmount, Money::from_cents(2500))
            .unwrap();

        assert!(ledger.amount_to_pay().is_zero());
    }

    #[test]
    fn test_negative_deposit_rejected_in_full() {
        let ledger = Ledger::empty("c-1");
        let err = ledger
            .apply(LedgerAccount::PaidAmount, Money::from_cents(-500))
            .unwrap_err();

        match err {
            CoreError::NegativeBalance { account, current, amount } => {
                assert_eq!(account, LedgerAccount::PaidAmount);
                assert!(current.is_zero());
                assert_eq!(amount.cents(), -500);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ledger.paid_amount().is_zero());
    }

    #[test]
    fn test_reduction_allowed_down_to_zero() {
        let ledger = Ledger::empty("c-1")
            .apply(LedgerAccount::OrdersTotal, Money::from_cents(1500))
            .unwrap();

        let reduced = ledger
            .apply(LedgerAccount::OrdersTotal, Money::from_cents(-1500))
            .unwrap();
        assert!(reduced.orders_total().is_zero());

        assert!(ledger
            .apply(LedgerAccount::OrdersTotal, Money::from_cents(-1501))
            .is_err());
    }

    #[test]
    fn test_overpayment_gives_credit() {
        let ledger = Ledger::empty("c-1")
            .apply(LedgerAccount::PaidAmount, Money::from_cents(1000))
            .unwrap();
        assert_eq!(ledger.amount_to_pay().cents(), -1000);
    }

    #[test]
    fn test_balance_overflow_rejected() {
        let ledger = Ledger::empty("c-1")
            .apply(LedgerAccount::PaidAmount, Money::from_cents(100))
            .unwrap();
        let err = ledger
            .apply(LedgerAccount::PaidAmount, Money::from_cents(i64::MAX))
            .unwrap_err();
        assert_eq!(err.to_string(), "paid_amount balance is out of range");
        assert_eq!(ledger.paid_amount().cents(), 100);
    }

    #[test]
    fn test_account_parsing() {
        assert_eq!("paid_amount".parse::<LedgerAccount>().unwrap(), LedgerAccount::PaidAmount);
        assert_eq!("orders_total".parse::<LedgerAccount>().unwrap(), LedgerAccount::OrdersTotal);
        assert!("cash".parse::<LedgerAccount>().is_err());
        assert_eq!(LedgerAccount::OrdersTotal.to_string(), "orders_total");
    }
}
