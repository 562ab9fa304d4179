//! Domain error types.

use order_store::{OrderId, StoreError};
use thiserror::Error;

use crate::order::OrderError;
use crate::report::ReportError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The order was rejected before anything was written.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The store failed; nothing from the save was persisted.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The order to edit or delete does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The report could not be built.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}
