//! Domain layer for the bookstore order editor.
//!
//! This crate provides:
//! - Order draft validation (the checks that run before anything is planned)
//! - Line item reconciliation: a pure diff of desired against persisted
//!   line items producing deletes, upserts and stock deltas
//! - `OrderService`, which loads, validates, reconciles and applies a save
//!   atomically through an `OrderStore`
//! - Sales report aggregation

pub mod error;
pub mod order;
pub mod report;

pub use error::DomainError;
pub use order::{
    DraftLineItem, LineItem, OrderDraft, OrderError, OrderService, ReconciliationPlan,
    SaveOutcome, StockLevels, ValidatedDraft, delivery_date, reconcile,
};
pub use report::{ReportError, ReportPeriod, SalesReport, SalesReportRow};
