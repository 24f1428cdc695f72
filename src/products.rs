//! Admin product operations: create/update/delete and embedding
//! regeneration for a single product.
//!
//! Upserting a product re-embeds it immediately when its descriptive text
//! changed (or it never had a vector). Embedding failure is non-fatal —
//! the product stays queryable through the deterministic fallback until a
//! later `embed pending` run succeeds.

use anyhow::{Context, Result};

use shopsense_core::error::{Error, Result as CoreResult};
use shopsense_core::models::{Product, StoredEmbedding};
use shopsense_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embed_cmd::hash_text;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::sqlite_store::SqliteStore;

/// Upsert a product and refresh its embedding if the source text changed.
/// Returns whether the product now has a fresh embedding.
pub async fn upsert_with_embedding<S: Store + ?Sized>(
    store: &S,
    provider: &dyn EmbeddingProvider,
    product: &Product,
) -> CoreResult<bool> {
    product.validate()?;
    store.upsert_product(product).await?;

    let source_text = product.embedding_text();
    let source_hash = hash_text(&source_text);
    if let Some(existing) = store.get_embedding(product.id).await? {
        if existing.source_hash == source_hash {
            return Ok(true);
        }
    }

    match provider.embed(&source_text).await {
        Ok(vector) => {
            let now = chrono::Utc::now().timestamp();
            store
                .upsert_embedding(&StoredEmbedding {
                    product_id: product.id,
                    vector,
                    source_text,
                    source_hash,
                    model: provider.model_name().to_string(),
                    created_at: now,
                    updated_at: now,
                })
                .await?;
            Ok(true)
        }
        Err(e) => {
            eprintln!(
                "Warning: could not embed product {}: {e}; it will be picked up by `embed pending`",
                product.id
            );
            Ok(false)
        }
    }
}

/// Regenerate the stored embedding for one product, unconditionally.
pub async fn regenerate_embedding<S: Store + ?Sized>(
    store: &S,
    provider: &dyn EmbeddingProvider,
    product_id: i64,
) -> CoreResult<()> {
    let product = store
        .get_product(product_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("product {product_id}")))?;

    let source_text = product.embedding_text();
    let vector = provider.embed(&source_text).await?;
    let now = chrono::Utc::now().timestamp();
    store
        .upsert_embedding(&StoredEmbedding {
            product_id,
            vector,
            source_hash: hash_text(&source_text),
            source_text,
            model: provider.model_name().to_string(),
            created_at: now,
            updated_at: now,
        })
        .await
}

/// CLI: create or update a product from a JSON document (inline or a
/// file path).
pub async fn run_upsert(config: &Config, json: &str) -> Result<()> {
    let content = if std::path::Path::new(json).is_file() {
        std::fs::read_to_string(json).with_context(|| format!("failed to read {json}"))?
    } else {
        json.to_string()
    };
    let product: Product =
        serde_json::from_str(&content).context("invalid product JSON")?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let provider = create_provider(&config.embedding)?;

    let embedded = upsert_with_embedding(&store, provider.as_ref(), &product).await?;
    println!(
        "upserted product {} ({})",
        product.id,
        if embedded { "embedded" } else { "embedding pending" }
    );

    store.pool().close().await;
    Ok(())
}

/// CLI: delete a product and its embedding.
pub async fn run_delete(config: &Config, product_id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    if store.delete_product(product_id).await? {
        println!("deleted product {product_id}");
    } else {
        println!("product {product_id} not found");
    }

    store.pool().close().await;
    Ok(())
}

/// CLI: regenerate one product's embedding.
pub async fn run_regenerate(config: &Config, product_id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let provider = create_provider(&config.embedding)?;

    regenerate_embedding(&store, provider.as_ref(), product_id).await?;
    println!("regenerated embedding for product {product_id}");

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
            description: "desc".into(),
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
    async fn upsert_embeds_new_product() {
        let store = InMemoryStore::new();
        let provider = DeterministicProvider::with_dims(32);

        let ok = upsert_with_embedding(&store, &provider, &product(1, "Copper Kettle"))
            .await
            .unwrap();
        assert!(ok);
        let embedding = store.get_embedding(1).await.unwrap().unwrap();
        assert_eq!(embedding.vector.len(), 32);
        assert_eq!(embedding.model, "deterministic");
    }

    #[tokio::test]
    async fn unchanged_text_skips_reembedding() {
        let store = InMemoryStore::new();
        let provider = DeterministicProvider::with_dims(32);
        let p = product(1, "Copper Kettle");

        upsert_with_embedding(&store, &provider, &p).await.unwrap();
        let first = store.get_embedding(1).await.unwrap().unwrap();

        upsert_with_embedding(&store, &provider, &p).await.unwrap();
        let second = store.get_embedding(1).await.unwrap().unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(first.source_hash, second.source_hash);
    }

    #[tokio::test]
    async fn changed_title_refreshes_embedding() {
        let store = InMemoryStore::new();
        let provider = DeterministicProvider::with_dims(32);

        upsert_with_embedding(&store, &provider, &product(1, "Copper Kettle"))
            .await
            .unwrap();
        let before = store.get_embedding(1).await.unwrap().unwrap();

        upsert_with_embedding(&store, &provider, &product(1, "Steel Kettle"))
            .await
            .unwrap();
        let after = store.get_embedding(1).await.unwrap().unwrap();
        assert_ne!(before.source_hash, after.source_hash);
        assert_ne!(before.vector, after.vector);
    }

    #[tokio::test]
    async fn regenerate_unknown_product_is_not_found() {
        let store = InMemoryStore::new();
        let provider = DeterministicProvider::with_dims(32);
        let err = regenerate_embedding(&store, &provider, 9).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
