//! Persisted entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CustomerId, LineItemId, Money, OrderId, OrderStatus, PaymentTypeId, StockEntryId, StoreId,
};

/// Per-store inventory record for a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub id: StockEntryId,
    pub store_id: StoreId,
    pub title: String,
    pub author: String,
    pub price: Money,
    /// Available copies. `None` means the entry is not tracked and never runs out.
    pub quantity: Option<i64>,
    /// Whether the book can be ordered beyond the copies on hand.
    pub is_available: bool,
}

impl StockEntry {
    /// Returns true if the entry has no quantity limit.
    pub fn is_unlimited(&self) -> bool {
        self.quantity.is_none()
    }

    /// Returns true if the entry may be picked for a line: it is marked
    /// available or still has copies on hand.
    pub fn is_offered(&self) -> bool {
        self.is_available || self.quantity.is_some_and(|q| q > 0)
    }

    /// Returns the quantity after applying `delta`, or `None` for unlimited entries.
    pub fn quantity_after(&self, delta: i64) -> Option<i64> {
        self.quantity.map(|q| q + delta)
    }
}

/// Data for registering a new stock entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStockEntry {
    pub store_id: StoreId,
    pub title: String,
    pub author: String,
    pub price: Money,
    pub quantity: Option<i64>,
    pub is_available: bool,
}

impl NewStockEntry {
    /// Creates an available, tracked stock entry.
    pub fn tracked(
        store_id: StoreId,
        title: impl Into<String>,
        author: impl Into<String>,
        price: Money,
        quantity: i64,
    ) -> Self {
        Self {
            store_id,
            title: title.into(),
            author: author.into(),
            price,
            quantity: Some(quantity),
            is_available: true,
        }
    }

    /// Creates an available stock entry without a quantity limit.
    pub fn unlimited(
        store_id: StoreId,
        title: impl Into<String>,
        author: impl Into<String>,
        price: Money,
    ) -> Self {
        Self {
            store_id,
            title: title.into(),
            author: author.into(),
            price,
            quantity: None,
            is_available: true,
        }
    }

    pub(crate) fn into_entry(self, id: StockEntryId) -> StockEntry {
        StockEntry {
            id,
            store_id: self.store_id,
            title: self.title,
            author: self.author,
            price: self.price,
            quantity: self.quantity,
            is_available: self.is_available,
        }
    }
}

/// A line item as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLineItem {
    pub id: LineItemId,
    pub stock_entry_id: StockEntryId,
    pub quantity: u32,
}

/// An order with its line items, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedOrder {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub payment_type_id: PaymentTypeId,
    pub status: OrderStatus,
    pub ordered_on: DateTime<Utc>,
    /// Line items in insertion order.
    pub items: Vec<PersistedLineItem>,
}

impl PersistedOrder {
    /// Returns a line item by ID.
    pub fn item(&self, id: LineItemId) -> Option<&PersistedLineItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Returns the total number of copies ordered.
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}
