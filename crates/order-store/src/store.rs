use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    ChangeSet, NewStockEntry, OrderId, OrderQuery, PersistedOrder, Result, StockEntry,
    StockEntryId, StoreError, StoreId,
};

/// Core trait for order persistence.
///
/// The store is the only place where orders, line items and stock quantities
/// change. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Retrieves an order with its line items.
    ///
    /// Returns None if the order doesn't exist.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<PersistedOrder>>;

    /// Retrieves orders matching a query.
    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<PersistedOrder>>;

    /// Retrieves the stock entries with the given IDs.
    ///
    /// Unknown IDs are skipped; callers decide whether that is an error.
    async fn get_stock_entries(&self, ids: &[StockEntryId]) -> Result<Vec<StockEntry>>;

    /// Retrieves every stock entry of a store.
    async fn list_stock_entries(&self, store_id: StoreId) -> Result<Vec<StockEntry>>;

    /// Registers a new stock entry and returns it with its assigned ID.
    async fn add_stock_entry(&self, entry: NewStockEntry) -> Result<StockEntry>;

    /// Applies a change set.
    ///
    /// The change set is applied atomically - either every header change,
    /// line item change and stock delta commits, or none do.
    ///
    /// Returns the ID of the order the change set targeted.
    async fn apply(&self, change_set: ChangeSet) -> Result<OrderId>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Retrieves an order, failing if it doesn't exist.
    async fn require_order(&self, order_id: OrderId) -> Result<PersistedOrder> {
        self.get_order(order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))
    }

    /// Retrieves stock entries keyed by ID.
    async fn stock_entries_by_id(
        &self,
        ids: &[StockEntryId],
    ) -> Result<HashMap<StockEntryId, StockEntry>> {
        let entries = self.get_stock_entries(ids).await?;
        Ok(entries.into_iter().map(|entry| (entry.id, entry)).collect())
    }

    /// Returns the current quantity of a stock entry.
    ///
    /// The outer `Option` is None when the entry doesn't exist, the inner
    /// one when it is unlimited.
    async fn stock_quantity(&self, id: StockEntryId) -> Result<Option<Option<i64>>> {
        let entries = self.get_stock_entries(&[id]).await?;
        Ok(entries.into_iter().next().map(|entry| entry.quantity))
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
