pub mod change_set;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use change_set::{ChangeSet, LineItemUpsert, NewOrder, OrderHeaderChange};
pub use common::{
    CustomerId, LineItemId, Money, OrderId, OrderStatus, PaymentTypeId, StockEntryId, StoreId,
};
pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use model::{NewStockEntry, PersistedLineItem, PersistedOrder, StockEntry};
pub use postgres::PostgresOrderStore;
pub use query::OrderQuery;
pub use store::{OrderStore, OrderStoreExt};
