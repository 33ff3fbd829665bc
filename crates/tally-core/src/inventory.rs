//! # Inventory Arithmetic
//!
//! Translates order-quantity changes into stock changes.
//!
//! ```text
//! quantity_delta  = new ordered quantity − old ordered quantity
//! stock change    = −quantity_delta
//!
//!   order 3 more  ──►  stock − 3
//!   order 2 fewer ──►  stock + 2
//!   remove item   ──►  stock + its full quantity
//! ```
//!
//! Stock may not go below zero; the adjustment is rejected with
//! `InsufficientStock` and the surrounding unit of work rolls back.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};

/// Stock moves opposite to the ordered quantity.
#[inline]
pub const fn stock_delta(quantity_delta: i64) -> i64 {
    -quantity_delta
}

/// Computes the product's stock after applying `quantity_delta`.
///
/// ## Example
/// ```rust
/// use tally_core::inventory::next_stock;
///
/// assert_eq!(next_stock("p-1", 10, 3).unwrap(), 7);   // ordered 3
/// assert_eq!(next_stock("p-1", 7, -2).unwrap(), 9);   // returned 2
/// assert!(next_stock("p-1", 2, 3).is_err());          // oversubscribed
/// ```
pub fn next_stock(product_id: &str, current: i64, quantity_delta: i64) -> CoreResult<i64> {
    let next = quantity_delta
        .checked_neg()
        .and_then(|delta| current.checked_add(delta))
        .ok_or_else(|| CoreError::overflow(format!("stock of {product_id}")))?;
    if next < 0 {
        return Err(CoreError::InsufficientStock {
            product_id: product_id.to_string(),
            available: current,
            requested: quantity_delta,
        });
    }
    Ok(next)
}

/// Nets per-product quantity deltas, dropping products whose changes cancel.
///
/// Keyed by product id in ascending order, which is also the order the
/// product locks are taken in.
pub fn net_quantity_deltas<'a, I>(changes: I) -> BTreeMap<String, i64>
where
    I: IntoIterator<Item = (&'a str, i64)>,
{
    let mut net: BTreeMap<String, i64> = BTreeMap::new();
    for (product_id, delta) in changes {
        *net.entry(product_id.to_string()).or_insert(0) += delta;
    }
    net.retain(|_, delta| *delta != 0);
    net
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_falls_as_quantity_rises() {
        assert_eq!(stock_delta(3), -3);
        assert_eq!(stock_delta(-4), 4);
        assert_eq!(next_stock("p", 10, 3).unwrap(), 7);
    }

    #[test]
    fn test_exact_depletion_allowed() {
        assert_eq!(next_stock("p", 5, 5).unwrap(), 0);
    }

    #[test]
    fn test_oversubscription_rejected() {
        let err = next_stock("p-1", 2, 3).unwrap_err();
        match err {
            CoreError::InsufficientStock { product_id, available, requested } => {
                assert_eq!(product_id, "p-1");
                assert_eq!(available, 2);
                assert_eq!(requested, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_stock_overflow_rejected() {
        // A return that would push stock past i64::MAX
        let err = next_stock("p-1", i64::MAX, -1).unwrap_err();
        assert!(matches!(err, CoreError::Overflow { .. }));
        assert!(next_stock("p-1", 0, i64::MIN).is_err());
    }

    #[test]
    fn test_net_deltas_cancel() {
        let net = net_quantity_deltas(vec![("b", 2), ("a", 1), ("b", -2), ("a", 4)]);
        assert_eq!(net.len(), 1);
        assert_eq!(net.get("a"), Some(&5));
        assert_eq!(net.get("b"), None);
    }
}
