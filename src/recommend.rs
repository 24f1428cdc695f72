//! CLI entry points for the recommendation paths.
//!
//! The algorithms live in [`shopsense_core::recommend`]; this module wires
//! them to the SQLite store and prints results.

use anyhow::Result;

use shopsense_core::recommend::{for_session, similar, trending, Recommendation};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

fn print_recommendations(recommendations: &[Recommendation]) {
    if recommendations.is_empty() {
        println!("No recommendations.");
        return;
    }
    for (i, rec) in recommendations.iter().enumerate() {
        println!(
            "{}. [{:.4}] {} — ${:.2}",
            i + 1,
            rec.score,
            rec.product.title,
            rec.product.price
        );
        println!("    why: {}", rec.reason);
    }
}

/// CLI: session-based recommendations.
pub async fn run_for_session(
    config: &Config,
    session_id: &str,
    limit: usize,
    exclude: Vec<i64>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let now = chrono::Utc::now().timestamp();
    let recommendations = for_session(&store, session_id, limit, &exclude, now).await?;
    print_recommendations(&recommendations);

    store.pool().close().await;
    Ok(())
}

/// CLI: products similar to a given one.
pub async fn run_similar(config: &Config, product_id: i64, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let recommendations = similar(&store, product_id, limit).await?;
    print_recommendations(&recommendations);

    store.pool().close().await;
    Ok(())
}

/// CLI: trending products.
pub async fn run_trending(config: &Config, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let recommendations = trending(&store, limit).await?;
    print_recommendations(&recommendations);

    store.pool().close().await;
    Ok(())
}
