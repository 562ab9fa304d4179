//! Order service: the save, delete and query operations of the order editor.

use std::collections::BTreeSet;

use chrono::Utc;
use order_store::{
    NewOrder, OrderHeaderChange, OrderId, OrderQuery, OrderStore, OrderStoreExt, PersistedOrder,
    StockEntryId, StoreId,
};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::report::{ReportPeriod, SalesReport};

use super::{OrderDraft, OrderError, ReconciliationPlan, StockLevels, ValidatedDraft, reconcile};

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub order_id: OrderId,
    pub plan: ReconciliationPlan,
}

/// Service for editing orders.
///
/// Every save validates the draft, reconciles it against the persisted line
/// items and hands the resulting change set to the store in one atomic apply.
/// Nothing is written when any step fails.
pub struct OrderService<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    /// Creates a new order service on top of a store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a new order from a draft.
    #[tracing::instrument(skip(self, draft))]
    pub async fn create_order(&self, draft: OrderDraft) -> Result<SaveOutcome, DomainError> {
        let (validated, plan) = self.plan(None, &draft).await.inspect_err(record_rejection)?;

        let order_id = OrderId::new();
        let header = OrderHeaderChange::Create(NewOrder {
            id: order_id,
            customer_id: validated.customer_id,
            payment_type_id: validated.payment_type_id,
            status: validated.status,
            ordered_on: Utc::now(),
        });

        self.store
            .apply(plan.clone().into_change_set(header))
            .await?;

        metrics::counter!("orders_saved_total", "operation" => "create").increment(1);
        tracing::info!(
            %order_id,
            lines = plan.upserts.len(),
            stock_entries = plan.stock_deltas.len(),
            "order created"
        );

        Ok(SaveOutcome { order_id, plan })
    }

    /// Saves an edited order.
    #[tracing::instrument(skip(self, draft))]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        draft: OrderDraft,
    ) -> Result<SaveOutcome, DomainError> {
        let existing = self.load(order_id).await?;
        let (validated, plan) = self
            .plan(Some(&existing), &draft)
            .await
            .inspect_err(record_rejection)?;

        let header = OrderHeaderChange::Update {
            order_id,
            customer_id: validated.customer_id,
            payment_type_id: validated.payment_type_id,
            status: validated.status,
        };

        self.store
            .apply(plan.clone().into_change_set(header))
            .await?;

        metrics::counter!("orders_saved_total", "operation" => "update").increment(1);
        tracing::info!(
            %order_id,
            deletes = plan.deletes.len(),
            upserts = plan.upserts.len(),
            stock_entries = plan.stock_deltas.len(),
            "order updated"
        );

        Ok(SaveOutcome { order_id, plan })
    }

    /// Creates the order when `order_id` is None, updates it otherwise.
    pub async fn save_order(
        &self,
        order_id: Option<OrderId>,
        draft: OrderDraft,
    ) -> Result<SaveOutcome, DomainError> {
        match order_id {
            Some(order_id) => self.update_order(order_id, draft).await,
            None => self.create_order(draft).await,
        }
    }

    /// Computes what a save would do without writing anything.
    #[tracing::instrument(skip(self, draft))]
    pub async fn preview(
        &self,
        order_id: Option<OrderId>,
        draft: OrderDraft,
    ) -> Result<ReconciliationPlan, DomainError> {
        let existing = match order_id {
            Some(order_id) => Some(self.load(order_id).await?),
            None => None,
        };
        let (_, plan) = self.plan(existing.as_ref(), &draft).await?;
        Ok(plan)
    }

    /// Deletes an order, returning every line's copies to stock.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, order_id: OrderId) -> Result<ReconciliationPlan, DomainError> {
        let existing = self.load(order_id).await?;

        // Removals need no stock lookups.
        let plan = reconcile(&[], &existing.items, &StockLevels::new())?;

        self.store
            .apply(plan.clone().into_change_set(OrderHeaderChange::Delete(order_id)))
            .await?;

        metrics::counter!("orders_deleted_total").increment(1);
        tracing::info!(%order_id, lines = plan.deletes.len(), "order deleted");

        Ok(plan)
    }

    /// Loads an order by ID.
    ///
    /// Returns None if the order doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<PersistedOrder>, DomainError> {
        Ok(self.store.get_order(order_id).await?)
    }

    /// Lists orders matching a query.
    pub async fn list_orders(&self, query: OrderQuery) -> Result<Vec<PersistedOrder>, DomainError> {
        Ok(self.store.list_orders(query).await?)
    }

    /// Builds the sales report of a store for a period.
    #[tracing::instrument(skip(self))]
    pub async fn sales_report(
        &self,
        store_id: StoreId,
        period: ReportPeriod,
    ) -> Result<SalesReport, DomainError> {
        let mut query = OrderQuery::new().store_id(store_id);
        query.from = period.start();
        query.to = period.end();

        let orders = self.store.list_orders(query).await?;
        let stock: StockLevels = self
            .store
            .list_stock_entries(store_id)
            .await?
            .into_iter()
            .map(|entry| (entry.id, entry))
            .collect();

        Ok(SalesReport::build(&orders, &stock, store_id, period))
    }

    async fn load(&self, order_id: OrderId) -> Result<PersistedOrder, DomainError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    /// Validates the draft and reconciles it against the existing order.
    async fn plan(
        &self,
        existing: Option<&PersistedOrder>,
        draft: &OrderDraft,
    ) -> Result<(ValidatedDraft, ReconciliationPlan), DomainError> {
        let validated = draft.validate()?;

        if let Some(existing) = existing
            && !existing.status.can_transition_to(validated.status)
        {
            return Err(OrderError::InvalidStatusTransition {
                from: existing.status,
                to: validated.status,
            }
            .into());
        }

        let original = existing.map(|o| o.items.as_slice()).unwrap_or_default();
        let ids: Vec<StockEntryId> = validated
            .items
            .iter()
            .map(|item| item.stock_entry_id)
            .chain(original.iter().map(|item| item.stock_entry_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let stock = self.store.stock_entries_by_id(&ids).await?;

        let plan = reconcile(&validated.items, original, &stock)?;
        Ok((validated, plan))
    }
}

fn record_rejection(err: &DomainError) {
    if let DomainError::Order(order_err) = err {
        metrics::counter!("orders_rejected_total", "reason" => order_err.kind()).increment(1);
        tracing::warn!(error = %order_err, "order rejected");
    }
}
