//! SQLite connection pool for the catalog store.
//!
//! WAL mode keeps concurrent searches readable while interaction and log
//! writes land; the busy timeout covers the brief writer contention that
//! batch embedding runs can cause. Pool size comes from `[db]
//! max_connections` so operators can widen it for server deployments.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::Config;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(config.db.max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open database at {}", db_path.display()))
}
