//! Batch embedding pipeline and upload-job progression.
//!
//! `embed pending` embeds products whose stored vector is missing or
//! stale (source-text hash mismatch); `embed rebuild` clears and
//! regenerates everything. `embed job <id>` drives the embedding stage of
//! a catalog upload job: the external loader moves the job from `pending`
//! to `processing` as it inserts products, and this module takes it
//! through `embedding` to `completed` or `failed`, keeping the counters
//! persisted per batch so an interrupted run resumes where it stopped.

use anyhow::Result;
use sha2::{Digest, Sha256};

use shopsense_core::error::{Error, Result as CoreResult};
use shopsense_core::models::{JobStatus, Product, StoredEmbedding};
use shopsense_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::sqlite_store::SqliteStore;

pub(crate) fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Products whose embedding is missing or whose source text changed since
/// it was stored.
pub async fn pending_products<S: Store + ?Sized>(store: &S) -> CoreResult<Vec<Product>> {
    let state = store.products_with_embedding_state().await?;
    Ok(state
        .into_iter()
        .filter_map(|(product, stored_hash)| {
            let current = hash_text(&product.embedding_text());
            match stored_hash {
                Some(hash) if hash == current => None,
                _ => Some(product),
            }
        })
        .collect())
}

/// Embed a product list in batches. Each batch failure is counted and
/// skipped — a transient sidecar outage loses one batch, not the run.
/// Returns `(embedded, failed)`.
pub async fn embed_products<S: Store + ?Sized>(
    store: &S,
    provider: &dyn EmbeddingProvider,
    products: &[Product],
    batch_size: usize,
) -> CoreResult<(u64, u64)> {
    let mut embedded = 0u64;
    let mut failed = 0u64;

    for batch in products.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.embedding_text()).collect();

        match provider.embed_batch(&texts).await {
            Ok(vectors) => {
                let now = chrono::Utc::now().timestamp();
                for ((product, text), vector) in
                    batch.iter().zip(texts.iter()).zip(vectors.into_iter())
                {
                    store
                        .upsert_embedding(&StoredEmbedding {
                            product_id: product.id,
                            vector,
                            source_text: text.clone(),
                            source_hash: hash_text(text),
                            model: provider.model_name().to_string(),
                            created_at: now,
                            updated_at: now,
                        })
                        .await?;
                    embedded += 1;
                }
            }
            Err(e) => {
                eprintln!("Warning: embedding batch failed: {e}");
                failed += batch.len() as u64;
            }
        }
    }

    Ok((embedded, failed))
}

/// CLI: embed products with missing or stale embeddings.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let provider = create_provider(&config.embedding)?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let mut pending = pending_products(&store).await?;
    if let Some(limit) = limit {
        pending.truncate(limit);
    }

    if dry_run {
        println!("embed pending (dry-run)");
        println!("  products needing embeddings: {}", pending.len());
        store.pool().close().await;
        return Ok(());
    }

    if pending.is_empty() {
        println!("embed pending");
        println!("  all products up to date");
        store.pool().close().await;
        return Ok(());
    }

    let total = pending.len();
    let (embedded, failed) = embed_products(&store, provider.as_ref(), &pending, batch_size).await?;

    println!("embed pending");
    println!("  total pending: {total}");
    println!("  embedded: {embedded}");
    println!("  failed: {failed}");

    store.pool().close().await;
    Ok(())
}

/// CLI: delete all embeddings and regenerate from scratch.
pub async fn run_embed_rebuild(config: &Config, batch_size_override: Option<usize>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let provider = create_provider(&config.embedding)?;
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);

    let cleared = store.clear_embeddings().await?;
    println!("embed rebuild — cleared {cleared} existing embeddings");

    let pending = pending_products(&store).await?;
    if pending.is_empty() {
        println!("  no products to embed");
        store.pool().close().await;
        return Ok(());
    }

    let total = pending.len();
    let (embedded, failed) = embed_products(&store, provider.as_ref(), &pending, batch_size).await?;

    println!("embed rebuild");
    println!("  total products: {total}");
    println!("  embedded: {embedded}");
    println!("  failed: {failed}");

    store.pool().close().await;
    Ok(())
}

/// Drive a catalog upload job through its embedding stage.
///
/// Expects the job in `processing` (the external loader has inserted the
/// products). Transitions to `embedding`, persists counters per batch,
/// then finalizes as `completed` — or `failed` with the error stored when
/// nothing could be embedded.
pub async fn run_job_embedding<S: Store + ?Sized>(
    store: &S,
    provider: &dyn EmbeddingProvider,
    job_id: i64,
    batch_size: usize,
) -> CoreResult<()> {
    let mut job = store
        .get_job(job_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("upload job {job_id}")))?;

    if job.status != JobStatus::Processing {
        return Err(Error::Conflict(format!(
            "job {} is {}, expected processing",
            job_id,
            job.status.as_str()
        )));
    }

    let pending = pending_products(store).await?;
    job.status = JobStatus::Embedding;
    job.total_products = job.total_products.max(pending.len() as i64);
    job.processed_products = job.total_products;
    store.update_job(&job).await?;

    let mut embedded = 0u64;
    let mut failed = 0u64;
    for batch in pending.chunks(batch_size.max(1)) {
        let (batch_embedded, batch_failed) =
            embed_products(store, provider, batch, batch_size).await?;
        embedded += batch_embedded;
        failed += batch_failed;

        // Counters land after every batch so progress survives a crash.
        job.embedded_products = embedded as i64;
        store.update_job(&job).await?;
    }

    let now = chrono::Utc::now().timestamp();
    if embedded == 0 && failed > 0 {
        job.status = JobStatus::Failed;
        job.error = Some(format!("all {failed} products failed to embed"));
    } else {
        job.status = JobStatus::Completed;
        if failed > 0 {
            job.error = Some(format!("{failed} products failed to embed"));
        }
    }
    job.completed_at = Some(now);
    store.update_job(&job).await?;
    Ok(())
}

/// CLI: run the embedding stage of an upload job.
pub async fn run_embed_job(config: &Config, job_id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let provider = create_provider(&config.embedding)?;

    run_job_embedding(
        &store,
        provider.as_ref(),
        job_id,
        config.embedding.batch_size,
    )
    .await?;

    if let Some(job) = store.get_job(job_id).await? {
        println!("job {} — {}", job.id, job.status.as_str());
        println!("  total: {}", job.total_products);
        println!("  embedded: {}", job.embedded_products);
        if let Some(ref error) = job.error {
            println!("  error: {error}");
        }
    }

    store.pool().close().await;
    Ok(())
}

/// CLI: show an upload job's progress.
pub async fn run_job_show(config: &Config, job_id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    match store.get_job(job_id).await? {
        Some(job) => {
            println!("job {} ({})", job.id, job.filename);
            println!("  status: {}", job.status.as_str());
            println!(
                "  progress: {}/{} processed, {} embedded",
                job.processed_products, job.total_products, job.embedded_products
            );
            if let Some(ref error) = job.error {
                println!("  error: {error}");
            }
        }
        None => println!("job {job_id} not found"),
    }

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DeterministicProvider;
    use shopsense_core::models::Availability;
    use shopsense_core::store::memory::InMemoryStore;

    fn product(id: i64, title: &str) -> Product {
        Product {
            id,
            sku: None,
            title: title.to_string(),
            description: String::new(),
            category: "general".into(),
            subcategory: None,
            brand: None,
            features: Vec::new(),
            price: 10.0,
            original_price: None,
            currency: "USD".into(),
            rating: None,
            review_count: 0,
            availability: Availability::InStock,
            stock_quantity: 5,
            image_url: None,
            featured: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn pending_detects_missing_and_stale() {
        let store = InMemoryStore::new();
        let provider = DeterministicProvider::with_dims(16);

        store.upsert_product(&product(1, "Lamp")).await.unwrap();
        store.upsert_product(&product(2, "Rug")).await.unwrap();

        let pending = pending_products(&store).await.unwrap();
        assert_eq!(pending.len(), 2);

        embed_products(&store, &provider, &pending, 10).await.unwrap();
        assert!(pending_products(&store).await.unwrap().is_empty());

        // Text change makes product 1 stale again.
        store.upsert_product(&product(1, "Brass Lamp")).await.unwrap();
        let stale = pending_products(&store).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, 1);
    }

    #[tokio::test]
    async fn job_runs_to_completed_with_counters() {
        let store = InMemoryStore::new();
        let provider = DeterministicProvider::with_dims(16);

        for id in 1..=3 {
            store.upsert_product(&product(id, "P")).await.unwrap();
        }
        let mut job = store.create_job("catalog.csv", 0).await.unwrap();
        job.status = JobStatus::Processing;
        job.total_products = 3;
        job.processed_products = 3;
        store.update_job(&job).await.unwrap();

        run_job_embedding(&store, &provider, job.id, 2).await.unwrap();

        let finished = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.embedded_products, 3);
        assert!(finished.completed_at.is_some());
    }

    #[tokio::test]
    async fn job_in_wrong_state_conflicts() {
        let store = InMemoryStore::new();
        let provider = DeterministicProvider::with_dims(16);
        let job = store.create_job("catalog.csv", 0).await.unwrap();

        let err = run_job_embedding(&store, &provider, job.id, 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn hash_is_stable() {
        assert_eq!(hash_text("abc"), hash_text("abc"));
        assert_ne!(hash_text("abc"), hash_text("abd"));
    }
}
