//! Types shared by every crate of the bookstore workspace.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{OrderStatus, ParseStatusError};
pub use types::{CustomerId, LineItemId, OrderId, PaymentTypeId, StockEntryId, StoreId};
