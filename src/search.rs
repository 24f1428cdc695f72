//! Search orchestrator: query → embed → rank → filter → log → explain.
//!
//! The sequence for one search:
//!
//! 1. Validate the query and limit.
//! 2. Embed the query under a soft deadline; on timeout or provider
//!    failure, degrade to the deterministic vector and flag the response.
//! 3. Fetch the bounded candidate pool and apply filters.
//! 4. Rank with the active weights (TTL-cached).
//! 5. Persist the search log and per-result explanations in one
//!    transaction — or, when ranking surfaces nothing and the query has a
//!    non-trivial token, run the keyword fallback and log it distinctly.
//!
//! A search cancelled (or past its hard deadline) before step 5 writes no
//! log row: the only writes happen at the end.

use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;

use shopsense_core::embedding::fallback_vector;
use shopsense_core::error::{Error, Result as CoreResult};
use shopsense_core::models::{
    Product, ResultExplanation, SearchFilters, SearchLog, QUERY_MAX_CHARS,
};
use shopsense_core::normalize::rating_score;
use shopsense_core::ranker::{
    query_terms, rank, round6, synthesize_explanation, RankOutcome, RankRequest, RankedProduct,
    ScoreBreakdown,
};
use shopsense_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::interactions::mint_session_id;
use crate::sqlite_store::SqliteStore;
use crate::weights::WeightsCache;

/// One search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub session_id: String,
    pub query: String,
    pub filters: SearchFilters,
    pub limit: Option<usize>,
}

/// The single result shape exposed to every transport.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RankedProduct>,
    /// `None` only when nothing was logged (empty result, no fallback).
    pub search_log_id: Option<i64>,
    pub response_time_ms: i64,
    /// True when the deterministic vector stood in for the embedding
    /// service.
    pub degraded: bool,
    /// `Some("keyword")` when the keyword fallback produced the results.
    pub fallback: Option<String>,
}

/// Run a search against a store and embedding provider.
pub async fn execute_search<S: Store + ?Sized>(
    store: &S,
    provider: &dyn EmbeddingProvider,
    weights_cache: &WeightsCache,
    config: &Config,
    request: &SearchRequest,
) -> CoreResult<SearchResponse> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(Error::InvalidInput("query must not be empty".into()));
    }
    if query.chars().count() > QUERY_MAX_CHARS {
        return Err(Error::InvalidInput(format!(
            "query exceeds {QUERY_MAX_CHARS} characters"
        )));
    }
    if request.session_id.trim().is_empty() {
        return Err(Error::InvalidInput("session id must not be empty".into()));
    }
    let limit = request.limit.unwrap_or(config.search.default_limit);
    if limit < 1 || limit > config.search.max_limit {
        return Err(Error::InvalidInput(format!(
            "limit must be in 1..={}",
            config.search.max_limit
        )));
    }

    let started = Instant::now();
    let now = chrono::Utc::now().timestamp();

    store.touch_session(&request.session_id, now).await?;

    // Soft deadline on the embedding call; past it the deterministic
    // fallback serves the request and the response is marked degraded.
    let soft = Duration::from_millis(config.search.soft_deadline_ms);
    let (query_vector, degraded) =
        match tokio::time::timeout(soft, provider.embed(query)).await {
            Ok(Ok(vector)) => (vector, false),
            Ok(Err(_)) | Err(_) => (fallback_vector(query, provider.dims()), true),
        };

    let candidates = store
        .candidate_products(config.search.candidate_limit)
        .await?
        .into_iter()
        .filter(|c| request.filters.matches(&c.product))
        .collect::<Vec<_>>();

    let weights = weights_cache
        .active(store, &config.default_weights(now))
        .await?;
    let min_score = request.filters.min_score.unwrap_or(config.search.min_score);

    let RankOutcome {
        results,
        skipped_products,
    } = rank(RankRequest {
        query,
        query_vector: &query_vector,
        candidates,
        weights: &weights,
        min_score,
        limit,
        now,
    });
    for product_id in &skipped_products {
        eprintln!("Warning: skipped product {product_id}: stored vector is not unit-normalized");
    }

    if !results.is_empty() {
        let response_time_ms = started.elapsed().as_millis() as i64;
        let log = build_log(request, query, &query_vector, &results, response_time_ms, now, false);
        let explanations = build_explanations(&results);
        let stored = store.record_search(&log, &explanations).await?;

        return Ok(SearchResponse {
            results,
            search_log_id: Some(stored.id),
            response_time_ms,
            degraded,
            fallback: None,
        });
    }

    // Ranking produced nothing. With at least one non-trivial token, fall
    // back to plain substring matching so a catalog hit is still served.
    if query_terms(query).is_empty() {
        return Ok(SearchResponse {
            results: Vec::new(),
            search_log_id: None,
            response_time_ms: started.elapsed().as_millis() as i64,
            degraded,
            fallback: None,
        });
    }

    let keyword_results = keyword_fallback(store, config, query, &request.filters, limit).await?;
    let response_time_ms = started.elapsed().as_millis() as i64;
    let log = build_log(
        request,
        query,
        &query_vector,
        &keyword_results,
        response_time_ms,
        now,
        true,
    );
    let explanations = build_explanations(&keyword_results);
    let stored = store.record_search(&log, &explanations).await?;

    Ok(SearchResponse {
        results: keyword_results,
        search_log_id: Some(stored.id),
        response_time_ms,
        degraded,
        fallback: Some("keyword".to_string()),
    })
}

/// [`execute_search`] under the hard wall-clock budget. Exceeding it
/// aborts the task at its next suspension point — before any log write —
/// and surfaces the `timeout` kind.
pub async fn execute_search_bounded<S: Store + ?Sized>(
    store: &S,
    provider: &dyn EmbeddingProvider,
    weights_cache: &WeightsCache,
    config: &Config,
    request: &SearchRequest,
) -> CoreResult<SearchResponse> {
    let hard = Duration::from_millis(config.search.hard_deadline_ms);
    match tokio::time::timeout(
        hard,
        execute_search(store, provider, weights_cache, config, request),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(format!(
            "search exceeded {}ms hard deadline",
            config.search.hard_deadline_ms
        ))),
    }
}

fn build_log(
    request: &SearchRequest,
    query: &str,
    query_vector: &[f32],
    results: &[RankedProduct],
    response_time_ms: i64,
    now: i64,
    keyword_fallback: bool,
) -> SearchLog {
    let mut filters =
        serde_json::to_value(&request.filters).unwrap_or(serde_json::json!({}));
    if keyword_fallback {
        filters["fallback"] = serde_json::json!("keyword");
    }

    SearchLog {
        id: 0,
        session_id: request.session_id.clone(),
        query: query.to_string(),
        query_vector: query_vector.to_vec(),
        result_count: results.len() as i64,
        response_time_ms,
        filters_json: filters.to_string(),
        created_at: now,
    }
}

fn build_explanations(results: &[RankedProduct]) -> Vec<ResultExplanation> {
    results
        .iter()
        .map(|r| ResultExplanation {
            id: 0,
            search_log_id: 0,
            product_id: r.product.id,
            position: r.rank as i64,
            final_score: r.final_score,
            semantic_score: r.scores.semantic,
            rating_score: r.scores.rating,
            price_score: r.scores.price,
            stock_score: r.scores.stock,
            recency_score: r.scores.recency,
            matched_terms: r.matched_terms.clone(),
            explanation: r.explanation.clone(),
            was_clicked: false,
        })
        .collect()
}

/// Substring search over title/description/category, scored at a flat 0.5
/// with the fixed fallback sub-score profile.
async fn keyword_fallback<S: Store + ?Sized>(
    store: &S,
    config: &Config,
    query: &str,
    filters: &SearchFilters,
    limit: usize,
) -> CoreResult<Vec<RankedProduct>> {
    let needle = query.to_lowercase();
    let candidates = store
        .candidate_products(config.search.candidate_limit)
        .await?;

    let mut matches: Vec<Product> = candidates
        .into_iter()
        .map(|c| c.product)
        .filter(|p| filters.matches(p) && p.search_text().contains(&needle))
        .collect();
    matches.sort_by_key(|p| p.id);
    matches.truncate(limit);

    Ok(matches
        .into_iter()
        .enumerate()
        .map(|(i, product)| {
            let scores = ScoreBreakdown {
                semantic: 0.5,
                rating: round6(rating_score(product.rating)),
                price: 0.5,
                stock: match product.availability {
                    shopsense_core::models::Availability::InStock => 1.0,
                    shopsense_core::models::Availability::LowStock => 0.5,
                    shopsense_core::models::Availability::OutOfStock => 0.0,
                },
                recency: 0.5,
            };
            let matched = query_terms(query);
            let explanation = synthesize_explanation(&product, &scores, &matched);
            RankedProduct {
                product,
                final_score: 0.5,
                scores,
                matched_terms: matched,
                explanation,
                rank: i + 1,
            }
        })
        .collect())
}

/// CLI: run a search and print the ranked results with their score
/// decomposition.
pub async fn run_search(
    config: &Config,
    query: &str,
    session: Option<String>,
    category: Option<String>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    in_stock_only: bool,
    limit: Option<usize>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let provider = create_provider(&config.embedding)?;
    let weights_cache = WeightsCache::from_config(config);

    let request = SearchRequest {
        session_id: session.unwrap_or_else(mint_session_id),
        query: query.to_string(),
        filters: SearchFilters {
            category,
            min_price,
            max_price,
            in_stock_only,
            min_score: None,
        },
        limit,
    };

    let response =
        execute_search_bounded(&store, provider.as_ref(), &weights_cache, config, &request).await?;

    if response.degraded {
        println!("(degraded: embedding service unavailable, deterministic vectors in use)");
    }
    if let Some(ref mode) = response.fallback {
        println!("(fallback: {mode})");
    }

    if response.results.is_empty() {
        println!("No results.");
    }
    for result in &response.results {
        println!(
            "{}. [{:.4}] {} — ${:.2}",
            result.rank, result.final_score, result.product.title, result.product.price
        );
        println!(
            "    semantic {:.4} | rating {:.4} | price {:.4} | stock {:.4} | recency {:.4}",
            result.scores.semantic,
            result.scores.rating,
            result.scores.price,
            result.scores.stock,
            result.scores.recency
        );
        if !result.matched_terms.is_empty() {
            println!("    matched: {}", result.matched_terms.join(", "));
        }
        println!("    why: {}", result.explanation);
    }

    if let Some(log_id) = response.search_log_id {
        println!();
        println!(
            "log id {} — {} result(s) in {}ms",
            log_id,
            response.results.len(),
            response.response_time_ms
        );
    }

    store.pool().close().await;
    Ok(())
}
