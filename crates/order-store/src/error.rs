use thiserror::Error;

use crate::{LineItemId, OrderId, StockEntryId};

/// Errors that can occur when reading from or writing to the order store.
///
/// Any error returned by [`OrderStore::apply`](crate::OrderStore::apply)
/// means nothing from the change set was persisted.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order already exists and cannot be created again.
    #[error("Order already exists: {0}")]
    OrderAlreadyExists(OrderId),

    /// The line item does not exist or belongs to another order.
    #[error("Line item {line_item_id} not found in order {order_id}")]
    LineItemNotFound {
        order_id: OrderId,
        line_item_id: LineItemId,
    },

    /// The stock entry does not exist.
    #[error("Stock entry not found: {0}")]
    StockEntryNotFound(StockEntryId),

    /// Applying a delta would leave a tracked stock entry below zero.
    #[error("Stock entry {stock_entry_id} would drop to {quantity}")]
    NegativeStock {
        stock_entry_id: StockEntryId,
        quantity: i64,
    },

    /// The change set is internally inconsistent.
    #[error("Invalid change set: {0}")]
    InvalidChangeSet(String),

    /// The storage backend failed for a reason other than the database driver.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
