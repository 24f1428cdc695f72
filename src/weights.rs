//! Active ranking-weights access, cache, and admin operations.
//!
//! The active weight row is read on every search, so it sits behind a
//! small TTL cache (default 5 s) that admin updates invalidate. Missing
//! weights are materialized once from the configured defaults — an
//! upsert-and-return, never a re-read loop.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::Result;

use shopsense_core::error::Result as CoreResult;
use shopsense_core::models::RankingWeights;
use shopsense_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// The public, versioned ranking formula. Surfaced to operators and
/// required to match the ranker implementation.
pub const RANKING_FORMULA: &str = "score = α·max(0, cos(vq,vp) + 0.5·|matched|/|queryTerms|) \
     + β·rating/5 + γ·priceNorm + δ·stockNorm + ε·recencyNorm";

/// TTL cache over the active weight row.
pub struct WeightsCache {
    ttl: Duration,
    cached: RwLock<Option<(Instant, RankingWeights)>>,
}

impl WeightsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cached: RwLock::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Duration::from_secs(config.search.weights_cache_ttl_secs))
    }

    /// The active weights, from cache when fresh, otherwise from the
    /// store (materializing `defaults` if no row is active).
    pub async fn active<S: Store + ?Sized>(
        &self,
        store: &S,
        defaults: &RankingWeights,
    ) -> CoreResult<RankingWeights> {
        if let Some((at, weights)) = self.cached.read().unwrap().as_ref() {
            if at.elapsed() < self.ttl {
                return Ok(weights.clone());
            }
        }

        let weights = store.ensure_active_weights(defaults).await?;
        *self.cached.write().unwrap() = Some((Instant::now(), weights.clone()));
        Ok(weights)
    }

    /// Drop the cached row; the next read goes to the store.
    pub fn invalidate(&self) {
        *self.cached.write().unwrap() = None;
    }
}

/// Activate a new weight tuple and invalidate the cache. Warns (without
/// rejecting) when the weights do not sum to 1.
pub async fn apply_update<S: Store + ?Sized>(
    store: &S,
    cache: &WeightsCache,
    mut weights: RankingWeights,
) -> CoreResult<RankingWeights> {
    weights.validate()?;
    if (weights.sum() - 1.0).abs() > 1e-9 {
        eprintln!(
            "Warning: weights sum to {:.3}, not 1.0; scores remain comparable \
             within a query only",
            weights.sum()
        );
    }
    let stored = store.activate_weights(&weights).await?;
    cache.invalidate();
    Ok(stored)
}

/// CLI: print the active weights and the public formula.
pub async fn run_get(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let now = chrono::Utc::now().timestamp();
    let weights = store.ensure_active_weights(&config.default_weights(now)).await?;

    println!("active weights (id {})", weights.id);
    println!("  label:    {}", weights.label);
    println!("  alpha:    {:.4}  (semantic)", weights.alpha);
    println!("  beta:     {:.4}  (rating)", weights.beta);
    println!("  gamma:    {:.4}  (price)", weights.gamma);
    println!("  delta:    {:.4}  (stock)", weights.delta);
    println!("  epsilon:  {:.4}  (recency)", weights.epsilon);
    println!("  sum:      {:.4}", weights.sum());
    println!();
    println!("formula: {RANKING_FORMULA}");

    store.pool().close().await;
    Ok(())
}

/// CLI: activate a new weight tuple.
pub async fn run_update(config: &Config, values: [f64; 5], label: Option<String>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let cache = WeightsCache::from_config(config);

    let now = chrono::Utc::now().timestamp();
    let weights = RankingWeights {
        id: 0,
        label: label.unwrap_or_else(|| "manual".to_string()),
        alpha: values[0],
        beta: values[1],
        gamma: values[2],
        delta: values[3],
        epsilon: values[4],
        active: true,
        created_at: now,
        updated_at: now,
    };

    let stored = apply_update(&store, &cache, weights).await?;
    println!(
        "activated weights id {} ({}, {}, {}, {}, {})",
        stored.id, stored.alpha, stored.beta, stored.gamma, stored.delta, stored.epsilon
    );

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsense_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn cache_materializes_defaults_once() {
        let store = InMemoryStore::new();
        let cache = WeightsCache::new(Duration::from_secs(5));
        let defaults = RankingWeights::with_defaults(0);

        let first = cache.active(&store, &defaults).await.unwrap();
        let second = cache.active(&store, &defaults).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.alpha, 0.5);
    }

    #[tokio::test]
    async fn update_invalidates_cache() {
        let store = InMemoryStore::new();
        let cache = WeightsCache::new(Duration::from_secs(3600));
        let defaults = RankingWeights::with_defaults(0);

        let before = cache.active(&store, &defaults).await.unwrap();
        assert_eq!(before.alpha, 0.5);

        let mut custom = RankingWeights::with_defaults(1);
        custom.alpha = 0.8;
        apply_update(&store, &cache, custom).await.unwrap();

        // Despite the long TTL, the cache must serve the new row.
        let after = cache.active(&store, &defaults).await.unwrap();
        assert_eq!(after.alpha, 0.8);
    }

    #[tokio::test]
    async fn update_rejects_negative_weights() {
        let store = InMemoryStore::new();
        let cache = WeightsCache::new(Duration::from_secs(5));
        let mut bad = RankingWeights::with_defaults(0);
        bad.gamma = -0.1;
        let err = apply_update(&store, &cache, bad).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn expired_cache_rereads_from_store() {
        let store = InMemoryStore::new();
        let cache = WeightsCache::new(Duration::from_secs(0));
        let defaults = RankingWeights::with_defaults(0);

        cache.active(&store, &defaults).await.unwrap();
        // Bypass apply_update so the cache is NOT invalidated; the zero
        // TTL alone must force the re-read.
        let mut custom = RankingWeights::with_defaults(1);
        custom.beta = 0.4;
        store.activate_weights(&custom).await.unwrap();

        let got = cache.active(&store, &defaults).await.unwrap();
        assert_eq!(got.beta, 0.4);
    }
}
