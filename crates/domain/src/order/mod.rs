//! Order editing: draft validation, reconciliation and the service that
//! applies a save.

mod delivery;
mod draft;
mod reconcile;
mod service;

pub use delivery::delivery_date;
pub use draft::{DraftLineItem, LineItem, OrderDraft, ValidatedDraft};
pub use reconcile::{ReconciliationPlan, StockLevels, reconcile};
pub use service::{OrderService, SaveOutcome};

use order_store::{LineItemId, OrderStatus, StockEntryId};
use thiserror::Error;

/// Reasons an order save is rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// No customer was selected.
    #[error("Customer is required")]
    CustomerRequired,

    /// The order has no line items.
    #[error("Order has no items")]
    NoItems,

    /// A line item has no book selected.
    #[error("Line {line}: no book selected")]
    MissingSelection { line: usize },

    /// A line item quantity is below one.
    #[error("Line {line}: invalid quantity {quantity} (must be at least 1)")]
    InvalidQuantity { line: usize, quantity: u32 },

    /// A line item asks for more copies than the stock entry can give.
    #[error("Line {line}: only {capacity} of \"{title}\" available, {requested} requested")]
    InsufficientStock {
        line: usize,
        stock_entry_id: StockEntryId,
        title: String,
        requested: u32,
        capacity: i64,
    },

    /// A new or moved line item picks a stock entry that is neither marked
    /// available nor has copies on hand.
    #[error("Line {line}: \"{title}\" is not available")]
    UnavailableStockEntry {
        line: usize,
        stock_entry_id: StockEntryId,
        title: String,
    },

    /// A line item references a stock entry that does not exist.
    #[error("Stock entry not found: {stock_entry_id}")]
    UnknownStockEntry { stock_entry_id: StockEntryId },

    /// A line item claims an identity the persisted order does not have.
    #[error("Line item {line_item_id} does not belong to this order")]
    UnknownLineItem { line_item_id: LineItemId },

    /// Two line items claim the same persisted identity.
    #[error("Line item {line_item_id} appears more than once")]
    DuplicateLineItem { line_item_id: LineItemId },

    /// The status change is not in the transition table.
    #[error("Invalid status transition: cannot move from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
}

impl OrderError {
    /// Returns a short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::CustomerRequired => "customer_required",
            OrderError::NoItems => "no_items",
            OrderError::MissingSelection { .. } => "missing_selection",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::UnavailableStockEntry { .. } => "unavailable_stock_entry",
            OrderError::UnknownStockEntry { .. } => "unknown_stock_entry",
            OrderError::UnknownLineItem { .. } => "unknown_line_item",
            OrderError::DuplicateLineItem { .. } => "duplicate_line_item",
            OrderError::InvalidStatusTransition { .. } => "invalid_status_transition",
        }
    }
}
