//! # Reconciliation Planning
//!
//! The pure half of an order update: diff the current line items against
//! the requested target set, and recompute the order total once.
//!
//! ## Update Diff
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Old items (by id)           Target entries                             │
//! │  ───────────────             ──────────────                             │
//! │  li-1  P1 × 3        ◄────── {item_id: li-1, P1 × 5}   → resized       │
//! │  li-2  P2 × 1        ◄────── {item_id: li-2, P2 × 1}   → unchanged     │
//! │  li-3  P3 × 4                (absent)                   → removed       │
//! │                              {item_id: –,   P4 × 2}    → added         │
//! │                                                                         │
//! │  quantity deltas:  P1 +2, P3 −4, P4 +2                                  │
//! │  stock deltas:     P1 −2, P3 +4, P4 −2                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Total Recomputation
//! `recompute` is called exactly once per unit of work. The ledger is
//! posted the returned `delta`, never an absolute total, so re-running an
//! update with an unchanged target posts nothing.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{CoreError, CoreResult};
use crate::inventory::net_quantity_deltas;
use crate::money::Money;
use crate::types::{ItemRequest, LineItem};

// =============================================================================
// Update Plan
// =============================================================================

/// An existing line item whose quantity changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resize {
    pub item: LineItem,
    pub new_quantity: i64,
}

impl Resize {
    /// new − old; positive means more is ordered.
    #[inline]
    pub fn quantity_delta(&self) -> i64 {
        self.new_quantity - self.item.quantity
    }
}

/// The outcome of diffing an order's items against a target set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    /// Items kept with the same quantity.
    pub unchanged: Vec<LineItem>,
    /// Items kept with a new quantity.
    pub resized: Vec<Resize>,
    /// Items absent from the target; their full quantity returns to stock.
    pub removed: Vec<LineItem>,
    /// Entries without an item id; each becomes a new line item.
    pub added: Vec<ItemRequest>,
}

impl UpdatePlan {
    /// True when applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.resized.is_empty() && self.removed.is_empty() && self.added.is_empty()
    }

    /// Net ordered-quantity change per product, zero entries dropped.
    pub fn quantity_deltas(&self) -> BTreeMap<String, i64> {
        let resized = self
            .resized
            .iter()
            .map(|r| (r.item.product_id.as_str(), r.quantity_delta()));
        let removed = self
            .removed
            .iter()
            .map(|item| (item.product_id.as_str(), -item.quantity));
        let added = self
            .added
            .iter()
            .map(|req| (req.product_id.as_str(), req.quantity));

        net_quantity_deltas(resized.chain(removed).chain(added))
    }
}

/// Diffs `old` against the requested `target` set.
///
/// ## Errors
/// - `UnknownEntity` - a target references an item id not in `old`
/// - `DuplicateItem` - the same item id appears twice in `target`
/// - `InvalidOrder` - a kept item's product differs from the request
///   (a product swap is expressed as remove + add)
pub fn plan_update(old: &[LineItem], target: &[ItemRequest]) -> CoreResult<UpdatePlan> {
    let by_id: HashMap<&str, &LineItem> = old.iter().map(|item| (item.id.as_str(), item)).collect();
    let mut kept: HashSet<&str> = HashSet::new();
    let mut plan = UpdatePlan::default();

    for request in target {
        let Some(item_id) = request.item_id.as_deref() else {
            plan.added.push(request.clone());
            continue;
        };

        let item = by_id
            .get(item_id)
            .copied()
            .ok_or_else(|| CoreError::unknown("LineItem", item_id))?;

        if !kept.insert(item.id.as_str()) {
            return Err(CoreError::DuplicateItem {
                item_id: item_id.to_string(),
            });
        }

        if item.product_id != request.product_id {
            return Err(CoreError::InvalidOrder(format!(
                "line item {} is for product {}, not {}",
                item.id, item.product_id, request.product_id
            )));
        }

        if item.quantity == request.quantity {
            plan.unchanged.push(item.clone());
        } else {
            plan.resized.push(Resize {
                item: item.clone(),
                new_quantity: request.quantity,
            });
        }
    }

    plan.removed = old
        .iter()
        .filter(|item| !kept.contains(item.id.as_str()))
        .cloned()
        .collect();

    Ok(plan)
}

// =============================================================================
// Recomputation
// =============================================================================

/// Result of recomputing an order from its final item set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recomputation {
    /// Σ line totals.
    pub total: Money,
    /// total + supplement.
    pub amount_to_pay: Money,
    /// amount_to_pay − previous amount_to_pay; what the ledger receives.
    pub delta: Money,
}

/// Recomputes an order's total from its final line items.
///
/// ## Example
/// ```rust
/// use tally_core::reconcile::recompute;
/// use tally_core::Money;
///
/// let r = recompute(&[], Money::zero(), Money::from_cents(1500));
/// assert!(r.total.is_zero());
/// assert_eq!(r.delta.cents(), -1500);
/// ```
pub fn recompute<'a, I>(items: I, supplement: Money, previous_amount_to_pay: Money) -> Recomputation
where
    I: IntoIterator<Item = &'a LineItem>,
{
    let total: Money = items.into_iter().map(LineItem::line_total).sum();
    let amount_to_pay = total + supplement;
    Recomputation {
        total,
        amount_to_pay,
        delta: amount_to_pay - previous_amount_to_pay,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
