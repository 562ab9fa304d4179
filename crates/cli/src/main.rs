//! `bookstore` entry point.

use anyhow::{Context, Result};
use clap::Parser;
use cli::config::{Config, LogFormat};
use cli::{Cli, Commands};
use domain::OrderService;
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout carries only command output.
    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn run<S: OrderStore>(store: S, command: Commands) -> Result<()> {
    let service = OrderService::new(store);
    let output = cli::execute(&service, command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_tracing(&config);

    let cli = Cli::parse();

    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL is not set, using an in-memory store discarded on exit");
        return run(InMemoryOrderStore::new(), cli.command).await;
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .context("connecting to Postgres")?;
    let store = PostgresOrderStore::new(pool);

    if let Commands::Migrate = cli.command {
        store
            .run_migrations()
            .await
            .context("running migrations")?;
        tracing::info!("migrations applied");
        return Ok(());
    }

    run(store, cli.command).await
}
