//! The unit of atomic application.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CustomerId, LineItemId, OrderId, OrderStatus, PaymentTypeId, StockEntryId, StoreError,
};

/// Header of an order that is about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub payment_type_id: PaymentTypeId,
    pub status: OrderStatus,
    pub ordered_on: DateTime<Utc>,
}

/// What happens to the order row itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderHeaderChange {
    /// Insert a new order.
    Create(NewOrder),

    /// Overwrite the editable header fields of an existing order.
    Update {
        order_id: OrderId,
        customer_id: CustomerId,
        payment_type_id: PaymentTypeId,
        status: OrderStatus,
    },

    /// Remove the order. Remaining line items go with it.
    Delete(OrderId),
}

impl OrderHeaderChange {
    /// Returns the order this change targets.
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderHeaderChange::Create(order) => order.id,
            OrderHeaderChange::Update { order_id, .. } => *order_id,
            OrderHeaderChange::Delete(order_id) => *order_id,
        }
    }
}

/// Insert or update of a single line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineItemUpsert {
    /// Add a new line item; the store assigns its ID.
    Insert {
        stock_entry_id: StockEntryId,
        quantity: u32,
    },

    /// Change the stock entry and/or quantity of an existing line item.
    Update {
        id: LineItemId,
        stock_entry_id: StockEntryId,
        quantity: u32,
    },
}

impl LineItemUpsert {
    /// Returns the stock entry the line item will reference.
    pub fn stock_entry_id(&self) -> StockEntryId {
        match self {
            LineItemUpsert::Insert { stock_entry_id, .. }
            | LineItemUpsert::Update { stock_entry_id, .. } => *stock_entry_id,
        }
    }

    /// Returns the quantity the line item will hold.
    pub fn quantity(&self) -> u32 {
        match self {
            LineItemUpsert::Insert { quantity, .. } | LineItemUpsert::Update { quantity, .. } => {
                *quantity
            }
        }
    }
}

/// Everything a single save writes: the order header change, line item
/// deletes and upserts, and signed stock quantity deltas.
///
/// Stores apply a change set atomically: either all of it commits or none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub header: OrderHeaderChange,
    pub deletes: Vec<LineItemId>,
    pub upserts: Vec<LineItemUpsert>,
    pub stock_deltas: BTreeMap<StockEntryId, i64>,
}

impl ChangeSet {
    /// Creates a change set touching only the order header.
    pub fn new(header: OrderHeaderChange) -> Self {
        Self {
            header,
            deletes: Vec::new(),
            upserts: Vec::new(),
            stock_deltas: BTreeMap::new(),
        }
    }

    /// Returns the order this change set targets.
    pub fn order_id(&self) -> OrderId {
        self.header.order_id()
    }

    /// Checks structural consistency before anything is written.
    pub fn validate(&self) -> Result<(), StoreError> {
        let invalid = |msg: &str| Err(StoreError::InvalidChangeSet(msg.to_string()));

        match self.header {
            OrderHeaderChange::Create(_) => {
                if !self.deletes.is_empty() {
                    return invalid("a new order has no line items to delete");
                }
                if self
                    .upserts
                    .iter()
                    .any(|u| matches!(u, LineItemUpsert::Update { .. }))
                {
                    return invalid("a new order has no line items to update");
                }
            }
            OrderHeaderChange::Delete(_) => {
                if !self.upserts.is_empty() {
                    return invalid("a deleted order cannot receive line items");
                }
            }
            OrderHeaderChange::Update { .. } => {}
        }

        let mut touched = HashSet::new();
        let updated = self.upserts.iter().filter_map(|u| match u {
            LineItemUpsert::Update { id, .. } => Some(*id),
            LineItemUpsert::Insert { .. } => None,
        });
        for id in self.deletes.iter().copied().chain(updated) {
            if !touched.insert(id) {
                return Err(StoreError::InvalidChangeSet(format!(
                    "line item {id} is changed more than once"
                )));
            }
        }

        if self.upserts.iter().any(|u| u.quantity() == 0) {
            return invalid("line item quantity must be positive");
        }

        Ok(())
    }
}
