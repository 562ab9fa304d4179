//! Line item reconciliation.
//!
//! Turns the desired line items of an edited order and the line items
//! currently persisted for it into a [`ReconciliationPlan`]: which persisted
//! lines to delete, which lines to insert or update, and how much each stock
//! entry's available quantity moves. Planning is pure; applying the plan is
//! the store's job.

use std::collections::{BTreeMap, HashMap, HashSet};

use order_store::{
    ChangeSet, LineItemId, LineItemUpsert, OrderHeaderChange, PersistedLineItem, StockEntry,
    StockEntryId,
};
use serde::{Deserialize, Serialize};

use super::{LineItem, OrderError};

/// Current stock entries keyed by ID.
pub type StockLevels = HashMap<StockEntryId, StockEntry>;

/// The writes needed to bring persisted line items to the desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    /// Persisted line items to remove.
    pub deletes: Vec<LineItemId>,

    /// Line items to insert, or to update when their book or quantity changed.
    pub upserts: Vec<LineItemUpsert>,

    /// Signed quantity change per stock entry. Zero deltas are omitted.
    pub stock_deltas: BTreeMap<StockEntryId, i64>,
}

impl ReconciliationPlan {
    /// Returns true if applying the plan changes no line item and no stock.
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.upserts.is_empty() && self.stock_deltas.is_empty()
    }

    /// Returns the delta for one stock entry.
    pub fn delta(&self, stock_entry_id: StockEntryId) -> i64 {
        self.stock_deltas
            .get(&stock_entry_id)
            .copied()
            .unwrap_or_default()
    }

    /// Returns the sum of all deltas.
    pub fn net_delta(&self) -> i64 {
        self.stock_deltas.values().sum()
    }

    /// Bundles the plan with an order header change for the store.
    pub fn into_change_set(self, header: OrderHeaderChange) -> ChangeSet {
        ChangeSet {
            header,
            deletes: self.deletes,
            upserts: self.upserts,
            stock_deltas: self.stock_deltas,
        }
    }
}

/// Plans the reconciliation of `desired` against `original`.
///
/// `desired` lines are matched to `original` lines by their original
/// identity. Unmatched originals are deleted and their quantity returned to
/// stock; matched lines moved to another book return their full original
/// quantity to the old entry and take the new quantity from the new one;
/// matched lines with only a quantity change take the difference; new lines
/// take their full quantity.
///
/// Before planning, every desired line is checked against
/// `available + original quantity` of its target entry, where the original
/// quantity is that of the matched persisted line (zero for new lines).
/// After planning, every tracked entry must still end at or above zero,
/// which catches moves and several lines jointly overdrawing one entry.
/// Unlimited entries are never checked.
pub fn reconcile(
    desired: &[LineItem],
    original: &[PersistedLineItem],
    stock: &StockLevels,
) -> Result<ReconciliationPlan, OrderError> {
    let originals: HashMap<LineItemId, &PersistedLineItem> =
        original.iter().map(|item| (item.id, item)).collect();

    let mut matched = HashSet::new();
    for line_item_id in desired.iter().filter_map(|item| item.original_id) {
        if !originals.contains_key(&line_item_id) {
            return Err(OrderError::UnknownLineItem { line_item_id });
        }
        if !matched.insert(line_item_id) {
            return Err(OrderError::DuplicateLineItem { line_item_id });
        }
    }

    check_line_capacity(desired, &originals, stock)?;

    let mut plan = ReconciliationPlan::default();
    let mut deltas: BTreeMap<StockEntryId, i64> = BTreeMap::new();

    for item in original.iter().filter(|item| !matched.contains(&item.id)) {
        plan.deletes.push(item.id);
        *deltas.entry(item.stock_entry_id).or_default() += i64::from(item.quantity);
    }

    for item in desired {
        let requested = i64::from(item.quantity);
        let persisted = item.original_id.and_then(|id| originals.get(&id).copied());

        match persisted {
            Some(persisted) if persisted.stock_entry_id != item.stock_entry_id => {
                *deltas.entry(persisted.stock_entry_id).or_default() +=
                    i64::from(persisted.quantity);
                *deltas.entry(item.stock_entry_id).or_default() -= requested;
                plan.upserts.push(LineItemUpsert::Update {
                    id: persisted.id,
                    stock_entry_id: item.stock_entry_id,
                    quantity: item.quantity,
                });
            }
            Some(persisted) if persisted.quantity != item.quantity => {
                *deltas.entry(item.stock_entry_id).or_default() -=
                    requested - i64::from(persisted.quantity);
                plan.upserts.push(LineItemUpsert::Update {
                    id: persisted.id,
                    stock_entry_id: item.stock_entry_id,
                    quantity: item.quantity,
                });
            }
            Some(_) => {}
            None => {
                *deltas.entry(item.stock_entry_id).or_default() -= requested;
                plan.upserts.push(LineItemUpsert::Insert {
                    stock_entry_id: item.stock_entry_id,
                    quantity: item.quantity,
                });
            }
        }
    }

    deltas.retain(|_, delta| *delta != 0);
    check_entry_totals(desired, &deltas, stock)?;

    plan.stock_deltas = deltas;
    Ok(plan)
}

fn check_line_capacity(
    desired: &[LineItem],
    originals: &HashMap<LineItemId, &PersistedLineItem>,
    stock: &StockLevels,
) -> Result<(), OrderError> {
    for (idx, item) in desired.iter().enumerate() {
        let entry = stock
            .get(&item.stock_entry_id)
            .ok_or(OrderError::UnknownStockEntry {
                stock_entry_id: item.stock_entry_id,
            })?;
        let original = item.original_id.and_then(|id| originals.get(&id));

        // Lines already on the entry keep it even after it stops being offered.
        let newly_picked = original.is_none_or(|o| o.stock_entry_id != item.stock_entry_id);
        if newly_picked && !entry.is_offered() {
            return Err(OrderError::UnavailableStockEntry {
                line: idx + 1,
                stock_entry_id: item.stock_entry_id,
                title: entry.title.clone(),
            });
        }

        let Some(available) = entry.quantity else {
            continue;
        };

        let returned = original.map_or(0, |original| i64::from(original.quantity));

        let capacity = available + returned;
        if i64::from(item.quantity) > capacity {
            return Err(insufficient(idx, item, entry, capacity));
        }
    }

    Ok(())
}

fn check_entry_totals(
    desired: &[LineItem],
    deltas: &BTreeMap<StockEntryId, i64>,
    stock: &StockLevels,
) -> Result<(), OrderError> {
    for (stock_entry_id, delta) in deltas {
        let Some(entry) = stock.get(stock_entry_id) else {
            continue;
        };
        let Some(remaining) = entry.quantity_after(*delta) else {
            continue;
        };
        if remaining >= 0 {
            continue;
        }

        // Blame the last line drawing on the entry; it is the one that tips it over.
        if let Some((idx, item)) = desired
            .iter()
            .enumerate()
            .rfind(|(_, item)| item.stock_entry_id == *stock_entry_id)
        {
            let capacity = (i64::from(item.quantity) + remaining).max(0);
            return Err(insufficient(idx, item, entry, capacity));
        }
    }

    Ok(())
}

fn insufficient(idx: usize, item: &LineItem, entry: &StockEntry, capacity: i64) -> OrderError {
    OrderError::InsufficientStock {
        line: idx + 1,
        stock_entry_id: item.stock_entry_id,
        title: entry.title.clone(),
        requested: item.quantity,
        capacity,
    }
}
