//! Database schema migrations.
//!
//! Creates all required tables and ensures idempotent execution. Designed
//! to be run via `shopsense init`; a migration failure at startup is the
//! unrecoverable-repository case (exit code 2).
//!
//! # Schema
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `products` | Catalog rows |
//! | `product_embeddings` | One vector per product (JSON array), with source text and staleness hash |
//! | `sessions` | Anonymous sessions with 30-day expiry |
//! | `interactions` | Append-only interaction events |
//! | `ranking_weights` | Weight tuples; exactly one active row |
//! | `search_logs` | One row per executed query |
//! | `search_result_explanations` | Per-result score decomposition |
//! | `evaluation_metrics` | Offline evaluator output |
//! | `upload_jobs` | Batch import observability |
//!
//! # Indexes
//!
//! - `idx_products_created_at` — candidate pool fetch (most-recent-first)
//! - `idx_products_category`, `idx_products_featured` — filters and cold start
//! - `idx_interactions_session` — session history reads
//! - `idx_search_logs_session` — click correlation
//! - `idx_explanations_log` — explanation reads per log
//!
//! # Legacy aliases
//!
//! Early deployments wrote camelCase column names (`createdAt`,
//! `stockQuantity`). [`run_migrations`] renames them to the snake_case
//! schema once, on startup; this is a one-shot concern, not a runtime
//! contract.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Run all database migrations.
///
/// Safe to call multiple times — every statement is idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY,
            sku TEXT UNIQUE,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            subcategory TEXT,
            brand TEXT,
            features_json TEXT NOT NULL DEFAULT '[]',
            price REAL NOT NULL,
            original_price REAL,
            currency TEXT NOT NULL DEFAULT 'USD',
            rating REAL,
            review_count INTEGER NOT NULL DEFAULT 0,
            availability TEXT NOT NULL DEFAULT 'in_stock',
            stock_quantity INTEGER NOT NULL DEFAULT 0,
            image_url TEXT,
            featured INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS product_embeddings (
            product_id INTEGER PRIMARY KEY,
            vector TEXT NOT NULL,
            source_text TEXT NOT NULL,
            source_hash TEXT NOT NULL,
            model TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (product_id) REFERENCES products(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            last_active_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            product_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            query TEXT,
            position INTEGER,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (product_id) REFERENCES products(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ranking_weights (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL DEFAULT 'default',
            alpha REAL NOT NULL,
            beta REAL NOT NULL,
            gamma REAL NOT NULL,
            delta REAL NOT NULL,
            epsilon REAL NOT NULL,
            active INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            query TEXT NOT NULL,
            query_vector TEXT NOT NULL,
            result_count INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL,
            filters_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS search_result_explanations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            search_log_id INTEGER NOT NULL,
            product_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            final_score REAL NOT NULL,
            semantic_score REAL NOT NULL,
            rating_score REAL NOT NULL,
            price_score REAL NOT NULL,
            stock_score REAL NOT NULL,
            recency_score REAL NOT NULL,
            matched_terms TEXT NOT NULL DEFAULT '[]',
            explanation TEXT NOT NULL DEFAULT '',
            was_clicked INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (search_log_id) REFERENCES search_logs(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evaluation_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            search_log_id INTEGER,
            kind TEXT NOT NULL,
            value REAL NOT NULL,
            query_count INTEGER,
            note TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS upload_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            total_products INTEGER NOT NULL DEFAULT 0,
            processed_products INTEGER NOT NULL DEFAULT 0,
            embedded_products INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            started_at INTEGER NOT NULL,
            completed_at INTEGER
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_products_created_at ON products(created_at DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_featured ON products(featured)")
        .execute(&pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_interactions_session ON interactions(session_id, created_at DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_search_logs_session ON search_logs(session_id, created_at DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_explanations_log ON search_result_explanations(search_log_id)",
    )
    .execute(&pool)
    .await?;

    backfill_legacy_aliases(&pool).await?;

    pool.close().await;
    Ok(())
}

/// Rename legacy camelCase columns left by early deployments. One-shot:
/// once renamed, the checks find nothing and this is a no-op.
async fn backfill_legacy_aliases(pool: &SqlitePool) -> Result<()> {
    const RENAMES: &[(&str, &str, &str)] = &[
        ("products", "createdAt", "created_at"),
        ("products", "updatedAt", "updated_at"),
        ("products", "stockQuantity", "stock_quantity"),
        ("products", "reviewCount", "review_count"),
        ("interactions", "sessionId", "session_id"),
        ("interactions", "productId", "product_id"),
    ];

    for (table, legacy, current) in RENAMES {
        let has_legacy: bool = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('{table}') WHERE name = '{legacy}'"
        ))
        .fetch_one(pool)
        .await?;

        if has_legacy {
            sqlx::query(&format!(
                "ALTER TABLE {table} RENAME COLUMN {legacy} TO {current}"
            ))
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}
