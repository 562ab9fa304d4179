use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    ChangeSet, LineItemId, LineItemUpsert, NewStockEntry, OrderHeaderChange, OrderId, OrderQuery,
    OrderStore, PersistedLineItem, PersistedOrder, Result, StockEntry, StockEntryId, StoreError,
    StoreId,
};

#[derive(Debug, Clone, Default)]
struct State {
    orders: HashMap<OrderId, PersistedOrder>,
    stock: HashMap<StockEntryId, StockEntry>,
}

impl State {
    fn apply(&mut self, change_set: &ChangeSet) -> Result<()> {
        let order_id = change_set.order_id();

        match &change_set.header {
            OrderHeaderChange::Create(new) => {
                if self.orders.contains_key(&new.id) {
                    return Err(StoreError::OrderAlreadyExists(new.id));
                }
                self.orders.insert(
                    new.id,
                    PersistedOrder {
                        id: new.id,
                        customer_id: new.customer_id,
                        payment_type_id: new.payment_type_id,
                        status: new.status,
                        ordered_on: new.ordered_on,
                        items: Vec::new(),
                    },
                );
            }
            OrderHeaderChange::Update {
                customer_id,
                payment_type_id,
                status,
                ..
            } => {
                let order = self
                    .orders
                    .get_mut(&order_id)
                    .ok_or(StoreError::OrderNotFound(order_id))?;
                order.customer_id = *customer_id;
                order.payment_type_id = *payment_type_id;
                order.status = *status;
            }
            OrderHeaderChange::Delete(_) => {}
        }

        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        for line_item_id in &change_set.deletes {
            let position = order
                .items
                .iter()
                .position(|item| item.id == *line_item_id)
                .ok_or(StoreError::LineItemNotFound {
                    order_id,
                    line_item_id: *line_item_id,
                })?;
            order.items.remove(position);
        }

        for upsert in &change_set.upserts {
            if !self.stock.contains_key(&upsert.stock_entry_id()) {
                return Err(StoreError::StockEntryNotFound(upsert.stock_entry_id()));
            }
            match upsert {
                LineItemUpsert::Insert {
                    stock_entry_id,
                    quantity,
                } => order.items.push(PersistedLineItem {
                    id: LineItemId::new(),
                    stock_entry_id: *stock_entry_id,
                    quantity: *quantity,
                }),
                LineItemUpsert::Update {
                    id,
                    stock_entry_id,
                    quantity,
                } => {
                    let item = order
                        .items
                        .iter_mut()
                        .find(|item| item.id == *id)
                        .ok_or(StoreError::LineItemNotFound {
                            order_id,
                            line_item_id: *id,
                        })?;
                    item.stock_entry_id = *stock_entry_id;
                    item.quantity = *quantity;
                }
            }
        }

        for (stock_entry_id, delta) in &change_set.stock_deltas {
            let entry = self
                .stock
                .get_mut(stock_entry_id)
                .ok_or(StoreError::StockEntryNotFound(*stock_entry_id))?;
            if let Some(next) = entry.quantity_after(*delta) {
                if next < 0 {
                    return Err(StoreError::NegativeStock {
                        stock_entry_id: *stock_entry_id,
                        quantity: next,
                    });
                }
                entry.quantity = Some(next);
            }
        }

        if let OrderHeaderChange::Delete(_) = change_set.header {
            self.orders.remove(&order_id);
        }

        Ok(())
    }
}

/// In-memory order store for tests and database-less runs.
///
/// Change sets are staged on a copy of the current state and swapped in only
/// after every step succeeded, so a failed apply leaves nothing behind.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<State>>,
    fail_on_apply: Arc<RwLock<bool>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following apply fail after staging, before the swap.
    pub async fn set_fail_on_apply(&self, fail: bool) {
        *self.fail_on_apply.write().await = fail;
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns a stock entry by ID.
    pub async fn stock_entry(&self, id: StockEntryId) -> Option<StockEntry> {
        self.state.read().await.stock.get(&id).cloned()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<PersistedOrder>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<PersistedOrder>> {
        let state = self.state.read().await;
        let lookup = |id: StockEntryId| state.stock.get(&id).cloned();

        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|order| query.matches(order) && query.matches_store(order, lookup))
            .cloned()
            .collect();

        orders.sort_by(|a, b| {
            b.ordered_on
                .cmp(&a.ordered_on)
                .then(a.id.cmp(&b.id))
        });

        let offset = query.offset.unwrap_or(0);
        let orders = orders.into_iter().skip(offset);
        let orders = match query.limit {
            Some(limit) => orders.take(limit).collect(),
            None => orders.collect(),
        };

        Ok(orders)
    }

    async fn get_stock_entries(&self, ids: &[StockEntryId]) -> Result<Vec<StockEntry>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.stock.get(id).cloned())
            .collect())
    }

    async fn list_stock_entries(&self, store_id: StoreId) -> Result<Vec<StockEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .stock
            .values()
            .filter(|entry| entry.store_id == store_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(entries)
    }

    async fn add_stock_entry(&self, entry: NewStockEntry) -> Result<StockEntry> {
        let entry = entry.into_entry(StockEntryId::new());
        self.state
            .write()
            .await
            .stock
            .insert(entry.id, entry.clone());
        Ok(entry)
    }

    #[tracing::instrument(skip(self, change_set), fields(order_id = %change_set.order_id()))]
    async fn apply(&self, change_set: ChangeSet) -> Result<OrderId> {
        change_set.validate()?;

        let mut state = self.state.write().await;
        let mut staged = state.clone();
        staged.apply(&change_set)?;

        if *self.fail_on_apply.read().await {
            tracing::warn!("simulated storage failure, discarding staged changes");
            return Err(StoreError::Backend("simulated failure".to_string()));
        }

        *state = staged;
        Ok(change_set.order_id())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{CustomerId, Money, NewOrder, OrderStatus, PaymentTypeId};

    fn new_order() -> NewOrder {
        NewOrder {
            id: OrderId::new(),
            customer_id: CustomerId::new(),
            payment_type_id: PaymentTypeId::new(),
            status: OrderStatus::Created,
            ordered_on: Utc::now(),
        }
    }

    async fn seed(store: &InMemoryOrderStore, quantity: Option<i64>) -> StockEntry {
        let mut entry = NewStockEntry::tracked(
            StoreId::new(),
            "The Master and Margarita",
            "Bulgakov M.A.",
            Money::from_cents(55000),
            quantity.unwrap_or(0),
        );
        entry.quantity = quantity;
        store.add_stock_entry(entry).await.unwrap()
    }

    fn create_with_line(entry: &StockEntry, quantity: u32) -> ChangeSet {
        let mut change_set = ChangeSet::new(OrderHeaderChange::Create(new_order()));
        change_set.upserts.push(LineItemUpsert::Insert {
            stock_entry_id: entry.id,
            quantity,
        });
        change_set
            .stock_deltas
            .insert(entry.id, -i64::from(quantity));
        change_set
    }

    #[tokio::test]
    async fn apply_creates_order_and_adjusts_stock() {
        let store = InMemoryOrderStore::new();
        let entry = seed(&store, Some(10)).await;

        let order_id = store.apply(create_with_line(&entry, 3)).await.unwrap();

        let order = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 3);
        assert_eq!(
            store.stock_entry(entry.id).await.unwrap().quantity,
            Some(7)
        );
    }

    #[tokio::test]
    async fn negative_stock_rolls_back_everything() {
        let store = InMemoryOrderStore::new();
        let entry = seed(&store, Some(2)).await;

        let result = store.apply(create_with_line(&entry, 3)).await;

        assert!(matches!(result, Err(StoreError::NegativeStock { .. })));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(
            store.stock_entry(entry.id).await.unwrap().quantity,
            Some(2)
        );
    }

    #[tokio::test]
    async fn unlimited_entries_stay_unlimited() {
        let store = InMemoryOrderStore::new();
        let entry = seed(&store, None).await;

        store.apply(create_with_line(&entry, 50)).await.unwrap();

        assert_eq!(store.stock_entry(entry.id).await.unwrap().quantity, None);
    }

    #[tokio::test]
    async fn simulated_failure_leaves_state_untouched() {
        let store = InMemoryOrderStore::new();
        let entry = seed(&store, Some(5)).await;
        store.set_fail_on_apply(true).await;

        let result = store.apply(create_with_line(&entry, 1)).await;

        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.order_count().await, 0);
        assert_eq!(
            store.stock_entry(entry.id).await.unwrap().quantity,
            Some(5)
        );
    }

    #[tokio::test]
    async fn update_of_unknown_line_item_fails() {
        let store = InMemoryOrderStore::new();
        let entry = seed(&store, Some(5)).await;
        let order_id = store.apply(create_with_line(&entry, 1)).await.unwrap();
        let order = store.get_order(order_id).await.unwrap().unwrap();

        let mut change_set = ChangeSet::new(OrderHeaderChange::Update {
            order_id,
            customer_id: order.customer_id,
            payment_type_id: order.payment_type_id,
            status: OrderStatus::Received,
        });
        change_set.upserts.push(LineItemUpsert::Update {
            id: LineItemId::new(),
            stock_entry_id: entry.id,
            quantity: 2,
        });

        let result = store.apply(change_set).await;
        assert!(matches!(result, Err(StoreError::LineItemNotFound { .. })));

        let unchanged = store.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, OrderStatus::Created);
    }

    #[tokio::test]
    async fn delete_removes_order() {
        let store = InMemoryOrderStore::new();
        let entry = seed(&store, Some(5)).await;
        let order_id = store.apply(create_with_line(&entry, 2)).await.unwrap();
        let order = store.get_order(order_id).await.unwrap().unwrap();

        let mut change_set = ChangeSet::new(OrderHeaderChange::Delete(order_id));
        change_set.deletes.push(order.items[0].id);
        change_set.stock_deltas.insert(entry.id, 2);
        store.apply(change_set).await.unwrap();

        assert!(store.get_order(order_id).await.unwrap().is_none());
        assert_eq!(
            store.stock_entry(entry.id).await.unwrap().quantity,
            Some(5)
        );
    }

    #[tokio::test]
    async fn list_orders_filters_by_store() {
        let store = InMemoryOrderStore::new();
        let entry = seed(&store, Some(5)).await;
        let other = seed(&store, Some(5)).await;
        store.apply(create_with_line(&entry, 1)).await.unwrap();
        store.apply(create_with_line(&other, 1)).await.unwrap();

        let all = store.list_orders(OrderQuery::new()).await.unwrap();
        assert_eq!(all.len(), 2);

        let scoped = store
            .list_orders(OrderQuery::new().store_id(entry.store_id))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].items[0].stock_entry_id, entry.id);
    }
}
