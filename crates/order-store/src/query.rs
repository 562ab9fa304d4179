use chrono::{DateTime, Utc};

use crate::{CustomerId, OrderStatus, PersistedOrder, StockEntry, StockEntryId, StoreId};

/// Builder for constructing order queries.
///
/// Results are ordered by `ordered_on` descending, newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by status.
    pub status: Option<OrderStatus>,

    /// Filter by customer.
    pub customer_id: Option<CustomerId>,

    /// Only orders with at least one line from this store's stock.
    pub store_id: Option<StoreId>,

    /// Filter by orders placed at or after this timestamp.
    pub from: Option<DateTime<Utc>>,

    /// Filter by orders placed at or before this timestamp.
    pub to: Option<DateTime<Utc>>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by customer.
    pub fn customer_id(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Filters by store.
    pub fn store_id(mut self, store_id: StoreId) -> Self {
        self.store_id = Some(store_id);
        self
    }

    /// Filters by orders placed at or after the timestamp.
    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    /// Filters by orders placed at or before the timestamp.
    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the order passes every filter except the store filter,
    /// which needs stock entry data.
    pub fn matches(&self, order: &PersistedOrder) -> bool {
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(customer_id) = self.customer_id
            && order.customer_id != customer_id
        {
            return false;
        }
        if let Some(from) = self.from
            && order.ordered_on < from
        {
            return false;
        }
        if let Some(to) = self.to
            && order.ordered_on > to
        {
            return false;
        }
        true
    }

    /// Returns true if the order passes the store filter.
    pub fn matches_store<F>(&self, order: &PersistedOrder, lookup: F) -> bool
    where
        F: Fn(StockEntryId) -> Option<StockEntry>,
    {
        match self.store_id {
            None => true,
            Some(store_id) => order
                .items
                .iter()
                .filter_map(|item| lookup(item.stock_entry_id))
                .any(|entry| entry.store_id == store_id),
        }
    }
}
