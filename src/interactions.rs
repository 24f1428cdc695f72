//! Session tracker: interaction ingest and history queries.
//!
//! Creates the session row on first contact (30-day expiry), stamps
//! `created_at` server-side, appends the event, and — for `search_click`
//! events carrying a query — marks the matching logged search result as
//! clicked so the offline evaluator can correlate clicks with rankings.

use anyhow::Result;

use shopsense_core::error::{Error, Result as CoreResult};
use shopsense_core::models::{Interaction, InteractionKind};
use shopsense_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Mint an opaque 32-byte (64 hex chars) session id. In production the
/// transport issues these; the CLI mints its own for ad-hoc use.
pub fn mint_session_id() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Ingest one interaction event.
pub async fn record_interaction<S: Store + ?Sized>(
    store: &S,
    session_id: &str,
    product_id: i64,
    kind: InteractionKind,
    query: Option<String>,
    position: Option<i64>,
) -> CoreResult<Interaction> {
    if session_id.trim().is_empty() {
        return Err(Error::InvalidInput("session id must not be empty".into()));
    }
    if let Some(pos) = position {
        if pos < 1 {
            return Err(Error::InvalidInput("position is 1-based".into()));
        }
    }
    // Every interaction references an existing product.
    store
        .get_product(product_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("product {product_id}")))?;

    let now = chrono::Utc::now().timestamp();
    store.touch_session(session_id, now).await?;

    let stored = store
        .append_interaction(&Interaction {
            id: 0,
            session_id: session_id.to_string(),
            product_id,
            kind,
            query: query.clone(),
            position,
            created_at: now,
        })
        .await?;

    // Close the loop on logged searches: a search_click with a query
    // flags the explanation row it came from.
    if kind == InteractionKind::SearchClick {
        if let Some(ref q) = query {
            store
                .mark_result_clicked(session_id, q.trim(), product_id)
                .await?;
        }
    }

    Ok(stored)
}

/// CLI: record an interaction.
pub async fn run_record(
    config: &Config,
    session_id: &str,
    product_id: i64,
    kind: &str,
    query: Option<String>,
    position: Option<i64>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let kind = InteractionKind::parse(kind)?;
    let stored = record_interaction(&store, session_id, product_id, kind, query, position).await?;
    println!(
        "recorded {} on product {} for session {} (id {})",
        stored.kind.as_str(),
        stored.product_id,
        stored.session_id,
        stored.id
    );

    store.pool().close().await;
    Ok(())
}

/// CLI: print a session's recent interactions and recently viewed products.
pub async fn run_history(config: &Config, session_id: &str, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let interactions = store.recent_interactions(session_id, limit).await?;
    if interactions.is_empty() {
        println!("No interactions for session {session_id}.");
    } else {
        println!("recent interactions ({}):", interactions.len());
        for i in &interactions {
            let when = chrono::DateTime::from_timestamp(i.created_at, 0)
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| i.created_at.to_string());
            match &i.query {
                Some(q) => println!(
                    "  {} product {} at {} (query: \"{}\")",
                    i.kind.as_str(),
                    i.product_id,
                    when,
                    q
                ),
                None => println!("  {} product {} at {}", i.kind.as_str(), i.product_id, when),
            }
        }

        let viewed = store.recently_viewed(session_id, limit).await?;
        if !viewed.is_empty() {
            let ids: Vec<String> = viewed.iter().map(|id| id.to_string()).collect();
            println!("recently viewed: {}", ids.join(", "));
        }
    }

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsense_core::models::{Availability, Product, ResultExplanation, SearchLog};
    use shopsense_core::store::memory::InMemoryStore;

    fn product(id: i64) -> Product {
        Product {
            id,
            sku: None,
            title: format!("Product {id}"),
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

    #[test]
    fn minted_session_ids_are_opaque_and_unique() {
        let a = mint_session_id();
        let b = mint_session_id();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn recording_creates_session_and_event() {
        let store = InMemoryStore::new();
        store.upsert_product(&product(1)).await.unwrap();

        let stored = record_interaction(
            &store,
            "sess",
            1,
            InteractionKind::View,
            None,
            None,
        )
        .await
        .unwrap();
        assert!(stored.id > 0);
        assert!(store.get_session("sess").await.unwrap().is_some());

        let recent = store.recent_interactions("sess", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn recording_rejects_unknown_product() {
        let store = InMemoryStore::new();
        let err = record_interaction(&store, "sess", 99, InteractionKind::View, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn recording_rejects_zero_position() {
        let store = InMemoryStore::new();
        store.upsert_product(&product(1)).await.unwrap();
        let err = record_interaction(
            &store,
            "sess",
            1,
            InteractionKind::SearchClick,
            Some("mug".into()),
            Some(0),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn search_click_marks_logged_result() {
        let store = InMemoryStore::new();
        store.upsert_product(&product(5)).await.unwrap();

        let log = store
            .record_search(
                &SearchLog {
                    id: 0,
                    session_id: "sess".into(),
                    query: "ceramic mug".into(),
                    query_vector: vec![1.0, 0.0],
                    result_count: 1,
                    response_time_ms: 3,
                    filters_json: "{}".into(),
                    created_at: 1,
                },
                &[ResultExplanation {
                    id: 0,
                    search_log_id: 0,
                    product_id: 5,
                    position: 1,
                    final_score: 0.8,
                    semantic_score: 0.7,
                    rating_score: 0.5,
                    price_score: 0.5,
                    stock_score: 1.0,
                    recency_score: 1.0,
                    matched_terms: vec!["ceramic".into(), "mug".into()],
                    explanation: String::new(),
                    was_clicked: false,
                }],
            )
            .await
            .unwrap();

        record_interaction(
            &store,
            "sess",
            5,
            InteractionKind::SearchClick,
            Some("ceramic mug".into()),
            Some(1),
        )
        .await
        .unwrap();

        let rows = store.explanations_for(log.id).await.unwrap();
        assert!(rows[0].was_clicked);
    }
}
