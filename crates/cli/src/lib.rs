//! Command line front end for the bookstore order editor.
//!
//! Each subcommand drives one `OrderService` operation and prints its
//! result as JSON. Commands run against any `OrderStore`; the binary picks
//! Postgres or the in-memory store from the configuration.

pub mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use domain::{OrderDraft, OrderService, ReportPeriod, delivery_date};
use order_store::{
    CustomerId, NewStockEntry, OrderId, OrderQuery, OrderStatus, OrderStore, StoreId,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// Shown in `--help`.
pub const IN_MEMORY_NOTE: &str = "Bookstore order editor.

Orders and stock are kept in Postgres when DATABASE_URL is set. Without it,
every run starts from an empty in-memory store that is discarded on exit, so
stock seeded in one run is not visible to the next.";

#[derive(Debug, Parser)]
#[command(name = "bookstore")]
#[command(about = "Bookstore order editor")]
#[command(long_about = IN_MEMORY_NOTE)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create or update an order from a JSON request file
    Save {
        /// Path to the request file
        request: PathBuf,
    },

    /// Print what saving a request would change, without writing anything
    Preview {
        /// Path to the request file
        request: PathBuf,
    },

    /// Delete an order and return its copies to stock
    Delete { order_id: Uuid },

    /// Print an order with its pickup date
    Show { order_id: Uuid },

    /// List orders, newest first
    List {
        #[arg(long)]
        status: Option<OrderStatus>,

        #[arg(long)]
        customer: Option<Uuid>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the sales report of a store
    Report {
        #[arg(long)]
        store: Uuid,

        /// First day of the period (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day of the period, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Add the stock entries of a JSON catalog file
    Seed {
        /// Path to a JSON array of stock entries
        catalog: PathBuf,
    },

    /// Run database migrations
    Migrate,
}

/// A save request: the edited order, plus its ID when it already exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub order_id: Option<OrderId>,

    #[serde(flatten)]
    pub draft: OrderDraft,
}

impl SaveRequest {
    /// Reads a request from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading request {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing request {}", path.display()))
    }
}

/// Runs one command and returns its JSON output.
///
/// `Migrate` needs a database connection and is handled by the binary.
pub async fn execute<S: OrderStore>(service: &OrderService<S>, command: Commands) -> Result<Value> {
    match command {
        Commands::Save { request } => save(service, SaveRequest::load(&request)?).await,
        Commands::Preview { request } => preview(service, SaveRequest::load(&request)?).await,
        Commands::Delete { order_id } => delete(service, OrderId::from_uuid(order_id)).await,
        Commands::Show { order_id } => show(service, OrderId::from_uuid(order_id)).await,
        Commands::List {
            status,
            customer,
            limit,
        } => {
            let mut query = OrderQuery::new();
            query.status = status;
            query.customer_id = customer.map(CustomerId::from_uuid);
            query.limit = limit;
            list(service, query).await
        }
        Commands::Report { store, from, to } => {
            let period = ReportPeriod::from_dates(from, to)?;
            report(service, StoreId::from_uuid(store), period).await
        }
        Commands::Seed { catalog } => {
            let raw = std::fs::read_to_string(&catalog)
                .with_context(|| format!("reading catalog {}", catalog.display()))?;
            let entries: Vec<NewStockEntry> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing catalog {}", catalog.display()))?;
            seed(service, entries).await
        }
        Commands::Migrate => bail!("migrate requires DATABASE_URL to point at Postgres"),
    }
}

pub async fn save<S: OrderStore>(service: &OrderService<S>, request: SaveRequest) -> Result<Value> {
    let outcome = service
        .save_order(request.order_id, request.draft)
        .await
        .context("saving order")?;
    Ok(serde_json::to_value(outcome)?)
}

pub async fn preview<S: OrderStore>(
    service: &OrderService<S>,
    request: SaveRequest,
) -> Result<Value> {
    let plan = service
        .preview(request.order_id, request.draft)
        .await
        .context("planning order")?;
    Ok(serde_json::to_value(plan)?)
}

pub async fn delete<S: OrderStore>(service: &OrderService<S>, order_id: OrderId) -> Result<Value> {
    let plan = service
        .delete_order(order_id)
        .await
        .with_context(|| format!("deleting order {order_id}"))?;
    Ok(json!({ "order_id": order_id, "plan": plan }))
}

pub async fn show<S: OrderStore>(service: &OrderService<S>, order_id: OrderId) -> Result<Value> {
    let Some(order) = service.get_order(order_id).await? else {
        bail!("order {order_id} not found");
    };
    let ready_on = delivery_date(order.ordered_on);
    Ok(json!({
        "order": order,
        "total_quantity": order.total_quantity(),
        "ready_on": ready_on,
    }))
}

pub async fn list<S: OrderStore>(service: &OrderService<S>, query: OrderQuery) -> Result<Value> {
    let orders = service.list_orders(query).await.context("listing orders")?;
    Ok(serde_json::to_value(orders)?)
}

pub async fn report<S: OrderStore>(
    service: &OrderService<S>,
    store_id: StoreId,
    period: ReportPeriod,
) -> Result<Value> {
    let report = service
        .sales_report(store_id, period)
        .await
        .with_context(|| format!("building sales report for store {store_id}"))?;
    Ok(serde_json::to_value(report)?)
}

pub async fn seed<S: OrderStore>(
    service: &OrderService<S>,
    entries: Vec<NewStockEntry>,
) -> Result<Value> {
    let mut added = Vec::with_capacity(entries.len());
    for entry in entries {
        added.push(service.store().add_stock_entry(entry).await?);
    }
    tracing::info!(count = added.len(), "stock entries added");
    Ok(serde_json::to_value(added)?)
}
