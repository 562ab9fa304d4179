//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use order_store::{
    ChangeSet, CustomerId, LineItemUpsert, Money, NewOrder, NewStockEntry, OrderHeaderChange,
    OrderId, OrderQuery, OrderStatus, OrderStore, OrderStoreExt, PaymentTypeId,
    PostgresOrderStore, StockEntry, StoreError, StoreId,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_bookstore_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders, stock_entries")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

async fn seed_entry(store: &PostgresOrderStore, quantity: Option<i64>) -> StockEntry {
    let store_id = StoreId::new();
    let entry = match quantity {
        Some(q) => NewStockEntry::tracked(
            store_id,
            "Crime and Punishment",
            "Dostoevsky F.M.",
            Money::from_cents(64000),
            q,
        ),
        None => NewStockEntry::unlimited(
            store_id,
            "Crime and Punishment",
            "Dostoevsky F.M.",
            Money::from_cents(64000),
        ),
    };
    store.add_stock_entry(entry).await.unwrap()
}

fn create_order(entry: &StockEntry, quantity: u32) -> ChangeSet {
    let mut change_set = ChangeSet::new(OrderHeaderChange::Create(NewOrder {
        id: OrderId::new(),
        customer_id: CustomerId::new(),
        payment_type_id: PaymentTypeId::new(),
        status: OrderStatus::Created,
        ordered_on: Utc::now(),
    }));
    change_set.upserts.push(LineItemUpsert::Insert {
        stock_entry_id: entry.id,
        quantity,
    });
    change_set
        .stock_deltas
        .insert(entry.id, -i64::from(quantity));
    change_set
}

mod apply {
    use super::*;

    #[tokio::test]
    async fn creates_order_with_items_and_decrements_stock() {
        let store = get_test_store().await;
        let entry = seed_entry(&store, Some(10)).await;

        let order_id = store.apply(create_order(&entry, 4)).await.unwrap();

        let order = store.require_order(order_id).await.unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 4);
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(store.stock_quantity(entry.id).await.unwrap(), Some(Some(6)));
    }

    #[tokio::test]
    async fn negative_stock_rolls_back_transaction() {
        let store = get_test_store().await;
        let entry = seed_entry(&store, Some(1)).await;

        let change_set = create_order(&entry, 3);
        let order_id = change_set.order_id();
        let result = store.apply(change_set).await;

        assert!(matches!(result, Err(StoreError::NegativeStock { .. })));
        assert!(store.get_order(order_id).await.unwrap().is_none());
        assert_eq!(store.stock_quantity(entry.id).await.unwrap(), Some(Some(1)));
    }

    #[tokio::test]
    async fn unlimited_stock_stays_null() {
        let store = get_test_store().await;
        let entry = seed_entry(&store, None).await;

        store.apply(create_order(&entry, 100)).await.unwrap();

        assert_eq!(store.stock_quantity(entry.id).await.unwrap(), Some(None));
    }

    #[tokio::test]
    async fn update_moves_line_to_other_entry() {
        let store = get_test_store().await;
        let first = seed_entry(&store, Some(5)).await;
        let second = seed_entry(&store, Some(5)).await;
        let order_id = store.apply(create_order(&first, 2)).await.unwrap();
        let order = store.require_order(order_id).await.unwrap();

        let mut change_set = ChangeSet::new(OrderHeaderChange::Update {
            order_id,
            customer_id: order.customer_id,
            payment_type_id: order.payment_type_id,
            status: OrderStatus::AwaitingPickup,
        });
        change_set.upserts.push(LineItemUpsert::Update {
            id: order.items[0].id,
            stock_entry_id: second.id,
            quantity: 1,
        });
        change_set.stock_deltas.insert(first.id, 2);
        change_set.stock_deltas.insert(second.id, -1);
        store.apply(change_set).await.unwrap();

        let order = store.require_order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::AwaitingPickup);
        assert_eq!(order.items[0].stock_entry_id, second.id);
        assert_eq!(store.stock_quantity(first.id).await.unwrap(), Some(Some(5)));
        assert_eq!(store.stock_quantity(second.id).await.unwrap(), Some(Some(4)));
    }

    #[tokio::test]
    async fn delete_cascades_to_items() {
        let store = get_test_store().await;
        let entry = seed_entry(&store, Some(5)).await;
        let order_id = store.apply(create_order(&entry, 2)).await.unwrap();

        let mut change_set = ChangeSet::new(OrderHeaderChange::Delete(order_id));
        change_set.stock_deltas.insert(entry.id, 2);
        store.apply(change_set).await.unwrap();

        assert!(store.get_order(order_id).await.unwrap().is_none());
        assert_eq!(store.stock_quantity(entry.id).await.unwrap(), Some(Some(5)));
    }

    #[tokio::test]
    async fn update_of_missing_order_fails() {
        let store = get_test_store().await;

        let result = store
            .apply(ChangeSet::new(OrderHeaderChange::Update {
                order_id: OrderId::new(),
                customer_id: CustomerId::new(),
                payment_type_id: PaymentTypeId::new(),
                status: OrderStatus::Created,
            }))
            .await;

        assert!(matches!(result, Err(StoreError::OrderNotFound(_))));
    }
}

mod queries {
    use super::*;

    #[tokio::test]
    async fn list_orders_by_store_and_status() {
        let store = get_test_store().await;
        let first = seed_entry(&store, Some(5)).await;
        let second = seed_entry(&store, Some(5)).await;
        store.apply(create_order(&first, 1)).await.unwrap();
        store.apply(create_order(&second, 1)).await.unwrap();

        let scoped = store
            .list_orders(OrderQuery::new().store_id(first.store_id))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].items[0].stock_entry_id, first.id);

        let received = store
            .list_orders(OrderQuery::new().status(OrderStatus::Received))
            .await
            .unwrap();
        assert!(received.is_empty());

        let limited = store
            .list_orders(OrderQuery::new().limit(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn list_stock_entries_is_scoped_to_store() {
        let store = get_test_store().await;
        let entry = seed_entry(&store, Some(3)).await;
        seed_entry(&store, Some(3)).await;

        let entries = store.list_stock_entries(entry.store_id).await.unwrap();
        assert_eq!(entries, vec![entry]);
    }
}
