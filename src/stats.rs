//! Row-count stats for operators and health checks.

use anyhow::Result;

use shopsense_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// CLI: print store row counts.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let stats = store.stats().await?;
    println!("products:     {}", stats.products);
    println!("embeddings:   {}", stats.embeddings);
    println!("sessions:     {}", stats.sessions);
    println!("interactions: {}", stats.interactions);
    println!("search logs:  {}", stats.search_logs);

    if stats.products > 0 && stats.embeddings < stats.products {
        println!(
            "note: {} product(s) lack embeddings — run `shopsense embed pending`",
            stats.products - stats.embeddings
        );
    }

    store.pool().close().await;
    Ok(())
}
