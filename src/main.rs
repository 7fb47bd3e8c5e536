mod access;
mod config;
mod error;
mod store;
mod survey;
mod web;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use store::MemoryStore;
use web::{PgStore, SharedStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;

    let store: SharedStore = match config.database_url.clone() {
        Some(url) => {
            let pool_size = config.pool_size;
            let store = tokio::task::spawn_blocking(move || {
                let pg = PgStore::connect(&url, pool_size)?;
                pg.run_migrations()?;
                Ok::<_, store::StoreError>(pg)
            })
            .await?
            .context("could not prepare the database")?;
            info!("Connected to database with {pool_size} connections");
            Arc::new(store)
        },
        None => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::default())
        },
    };

    web::serve(config.bind_address, store).await
        .with_context(|| format!("could not serve on {}", config.bind_address))
}
