use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ChangeSet, CustomerId, LineItemId, LineItemUpsert, Money, NewStockEntry, OrderHeaderChange,
    OrderId, OrderQuery, OrderStatus, OrderStore, PaymentTypeId, PersistedLineItem,
    PersistedOrder, Result, StockEntry, StockEntryId, StoreError, StoreId,
};

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_stock_entry(row: PgRow) -> Result<StockEntry> {
        Ok(StockEntry {
            id: StockEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            store_id: StoreId::from_uuid(row.try_get::<Uuid, _>("store_id")?),
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            quantity: row.try_get("quantity")?,
            is_available: row.try_get("is_available")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<PersistedOrder> {
        let status: String = row.try_get("status")?;
        let status: OrderStatus = status
            .parse()
            .map_err(|e: common::ParseStatusError| StoreError::Backend(e.to_string()))?;

        Ok(PersistedOrder {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            payment_type_id: PaymentTypeId::from_uuid(row.try_get::<Uuid, _>("payment_type_id")?),
            status,
            ordered_on: row.try_get("ordered_on")?,
            items: Vec::new(),
        })
    }

    fn row_to_line_item(row: &PgRow) -> Result<(OrderId, PersistedLineItem)> {
        let quantity: i64 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| StoreError::Backend(format!("line item quantity out of range: {quantity}")))?;

        Ok((
            OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            PersistedLineItem {
                id: LineItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
                stock_entry_id: StockEntryId::from_uuid(row.try_get::<Uuid, _>("stock_entry_id")?),
                quantity,
            },
        ))
    }

    /// Attaches line items to already loaded order headers.
    async fn load_items(&self, orders: &mut [PersistedOrder]) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, stock_entry_id, quantity
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY seq ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<OrderId, Vec<PersistedLineItem>> = HashMap::new();
        for row in &rows {
            let (order_id, item) = Self::row_to_line_item(row)?;
            by_order.entry(order_id).or_default().push(item);
        }

        for order in orders.iter_mut() {
            order.items = by_order.remove(&order.id).unwrap_or_default();
        }

        Ok(())
    }

    async fn apply_header(
        tx: &mut Transaction<'_, Postgres>,
        header: &OrderHeaderChange,
    ) -> Result<()> {
        match header {
            OrderHeaderChange::Create(order) => {
                sqlx::query(
                    r#"
                    INSERT INTO orders (id, customer_id, payment_type_id, status, ordered_on)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(order.id.as_uuid())
                .bind(order.customer_id.as_uuid())
                .bind(order.payment_type_id.as_uuid())
                .bind(order.status.as_str())
                .bind(order.ordered_on)
                .execute(&mut **tx)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(ref db_err) = e
                        && db_err.constraint() == Some("orders_pkey")
                    {
                        return StoreError::OrderAlreadyExists(order.id);
                    }
                    StoreError::Database(e)
                })?;
            }
            OrderHeaderChange::Update {
                order_id,
                customer_id,
                payment_type_id,
                status,
            } => {
                let result = sqlx::query(
                    r#"
                    UPDATE orders
                    SET customer_id = $2, payment_type_id = $3, status = $4
                    WHERE id = $1
                    "#,
                )
                .bind(order_id.as_uuid())
                .bind(customer_id.as_uuid())
                .bind(payment_type_id.as_uuid())
                .bind(status.as_str())
                .execute(&mut **tx)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::OrderNotFound(*order_id));
                }
            }
            OrderHeaderChange::Delete(order_id) => {
                let exists: Option<Uuid> =
                    sqlx::query_scalar("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
                        .bind(order_id.as_uuid())
                        .fetch_optional(&mut **tx)
                        .await?;

                if exists.is_none() {
                    return Err(StoreError::OrderNotFound(*order_id));
                }
            }
        }

        Ok(())
    }

    async fn apply_stock_delta(
        tx: &mut Transaction<'_, Postgres>,
        stock_entry_id: StockEntryId,
        delta: i64,
    ) -> Result<()> {
        let row: Option<PgRow> =
            sqlx::query("SELECT quantity FROM stock_entries WHERE id = $1 FOR UPDATE")
                .bind(stock_entry_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;

        let row = row.ok_or(StoreError::StockEntryNotFound(stock_entry_id))?;
        let Some(current) = row.try_get::<Option<i64>, _>("quantity")? else {
            // Untracked entries never change.
            return Ok(());
        };

        let next = current + delta;
        if next < 0 {
            return Err(StoreError::NegativeStock {
                stock_entry_id,
                quantity: next,
            });
        }

        sqlx::query("UPDATE stock_entries SET quantity = $2 WHERE id = $1")
            .bind(stock_entry_id.as_uuid())
            .bind(next)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn get_order(&self, order_id: OrderId) -> Result<Option<PersistedOrder>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, customer_id, payment_type_id, status, ordered_on
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut orders = [Self::row_to_order(&row)?];
                self.load_items(&mut orders).await?;
                let [order] = orders;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<PersistedOrder>> {
        let mut sql = String::from(
            "SELECT o.id, o.customer_id, o.payment_type_id, o.status, o.ordered_on FROM orders o WHERE 1=1",
        );
        let mut param_count = 0;

        // Build dynamic query
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.status = ${param_count}"));
        }
        if query.customer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.customer_id = ${param_count}"));
        }
        if query.store_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM order_items oi JOIN stock_entries se ON se.id = oi.stock_entry_id WHERE oi.order_id = o.id AND se.store_id = ${param_count})"
            ));
        }
        if query.from.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.ordered_on >= ${param_count}"));
        }
        if query.to.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND o.ordered_on <= ${param_count}"));
        }

        sql.push_str(" ORDER BY o.ordered_on DESC, o.id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(customer_id) = query.customer_id {
            sqlx_query = sqlx_query.bind(customer_id.as_uuid());
        }
        if let Some(store_id) = query.store_id {
            sqlx_query = sqlx_query.bind(store_id.as_uuid());
        }
        if let Some(from) = query.from {
            sqlx_query = sqlx_query.bind(from);
        }
        if let Some(to) = query.to {
            sqlx_query = sqlx_query.bind(to);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        self.load_items(&mut orders).await?;

        Ok(orders)
    }

    async fn get_stock_entries(&self, ids: &[StockEntryId]) -> Result<Vec<StockEntry>> {
        let ids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, store_id, title, author, price_cents, quantity, is_available
            FROM stock_entries
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_stock_entry).collect()
    }

    async fn list_stock_entries(&self, store_id: StoreId) -> Result<Vec<StockEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, store_id, title, author, price_cents, quantity, is_available
            FROM stock_entries
            WHERE store_id = $1
            ORDER BY title ASC
            "#,
        )
        .bind(store_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_stock_entry).collect()
    }

    async fn add_stock_entry(&self, entry: NewStockEntry) -> Result<StockEntry> {
        let entry = entry.into_entry(StockEntryId::new());

        sqlx::query(
            r#"
            INSERT INTO stock_entries (id, store_id, title, author, price_cents, quantity, is_available)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.store_id.as_uuid())
        .bind(&entry.title)
        .bind(&entry.author)
        .bind(entry.price.cents())
        .bind(entry.quantity)
        .bind(entry.is_available)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    #[tracing::instrument(skip(self, change_set), fields(order_id = %change_set.order_id()))]
    async fn apply(&self, change_set: ChangeSet) -> Result<OrderId> {
        change_set.validate()?;
        let started = Instant::now();
        let order_id = change_set.order_id();

        // Dropping the transaction on any early return rolls it back
        let mut tx = self.pool.begin().await?;

        Self::apply_header(&mut tx, &change_set.header).await?;

        for line_item_id in &change_set.deletes {
            let result = sqlx::query("DELETE FROM order_items WHERE id = $1 AND order_id = $2")
                .bind(line_item_id.as_uuid())
                .bind(order_id.as_uuid())
                .execute(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::LineItemNotFound {
                    order_id,
                    line_item_id: *line_item_id,
                });
            }
        }

        for upsert in &change_set.upserts {
            match upsert {
                LineItemUpsert::Insert {
                    stock_entry_id,
                    quantity,
                } => {
                    sqlx::query(
                        r#"
                        INSERT INTO order_items (id, order_id, stock_entry_id, quantity)
                        VALUES ($1, $2, $3, $4)
                        "#,
                    )
                    .bind(LineItemId::new().as_uuid())
                    .bind(order_id.as_uuid())
                    .bind(stock_entry_id.as_uuid())
                    .bind(i64::from(*quantity))
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| foreign_key_to_stock_error(e, *stock_entry_id))?;
                }
                LineItemUpsert::Update {
                    id,
                    stock_entry_id,
                    quantity,
                } => {
                    let result = sqlx::query(
                        r#"
                        UPDATE order_items
                        SET stock_entry_id = $3, quantity = $4
                        WHERE id = $1 AND order_id = $2
                        "#,
                    )
                    .bind(id.as_uuid())
                    .bind(order_id.as_uuid())
                    .bind(stock_entry_id.as_uuid())
                    .bind(i64::from(*quantity))
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| foreign_key_to_stock_error(e, *stock_entry_id))?;

                    if result.rows_affected() == 0 {
                        return Err(StoreError::LineItemNotFound {
                            order_id,
                            line_item_id: *id,
                        });
                    }
                }
            }
        }

        for (stock_entry_id, delta) in &change_set.stock_deltas {
            Self::apply_stock_delta(&mut tx, *stock_entry_id, *delta).await?;
        }

        if let OrderHeaderChange::Delete(_) = change_set.header {
            sqlx::query("DELETE FROM orders WHERE id = $1")
                .bind(order_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        metrics::histogram!("order_store_apply_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(order_id)
    }
}

fn foreign_key_to_stock_error(e: sqlx::Error, stock_entry_id: StockEntryId) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some("order_items_stock_entry_id_fkey")
    {
        return StoreError::StockEntryNotFound(stock_entry_id);
    }
    StoreError::Database(e)
}
