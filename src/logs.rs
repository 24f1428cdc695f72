//! Search-log inspection for operators.

use anyhow::Result;

use shopsense_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// CLI: list recent search logs.
pub async fn run_list(config: &Config, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let logs = store.list_search_logs(limit).await?;
    if logs.is_empty() {
        println!("No search logs.");
    }
    for log in &logs {
        let when = chrono::DateTime::from_timestamp(log.created_at, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| log.created_at.to_string());
        println!(
            "{:>5}  {}  \"{}\"  {} result(s), {}ms  session {}",
            log.id,
            when,
            log.query,
            log.result_count,
            log.response_time_ms,
            &log.session_id[..log.session_id.len().min(12)]
        );
        if log.filters_json != "{}" {
            println!("       filters: {}", log.filters_json);
        }
    }

    store.pool().close().await;
    Ok(())
}

/// CLI: show one log with its persisted score decomposition, exactly as
/// an auditor would replay it.
pub async fn run_show(config: &Config, log_id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let Some(log) = store.get_search_log(log_id).await? else {
        println!("log {log_id} not found");
        store.pool().close().await;
        return Ok(());
    };

    println!("log {} — \"{}\"", log.id, log.query);
    println!(
        "  {} result(s), {}ms, filters {}",
        log.result_count, log.response_time_ms, log.filters_json
    );
    println!("  query vector: {} dims", log.query_vector.len());

    for e in store.explanations_for(log.id).await? {
        let clicked = if e.was_clicked { "  [clicked]" } else { "" };
        println!(
            "  {}. product {}  final {:.6}{clicked}",
            e.position, e.product_id, e.final_score
        );
        println!(
            "     semantic {:.6} | rating {:.6} | price {:.6} | stock {:.6} | recency {:.6}",
            e.semantic_score, e.rating_score, e.price_score, e.stock_score, e.recency_score
        );
        if !e.matched_terms.is_empty() {
            println!("     matched: {}", e.matched_terms.join(", "));
        }
        println!("     why: {}", e.explanation);
    }

    store.pool().close().await;
    Ok(())
}
