//! Storage abstraction for the discovery engine.
//!
//! The [`Store`] trait defines every persistence operation the search,
//! recommendation, and evaluation pipelines need, enabling pluggable
//! backends (SQLite in the application crate, in-memory here for tests).
//! The store is the sole owner of persistent mutable state; every other
//! component holds only per-request data.
//!
//! Implementations must be `Send + Sync`, perform each public write as a
//! single logical transaction, and map connectivity loss to the
//! [`Unavailable`](crate::error::Error::Unavailable) kind rather than
//! panicking — callers degrade rather than crash.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    EvaluationMetric, Interaction, Product, RankingWeights, ResultExplanation, SearchLog, Session,
    StoredEmbedding, UploadJob,
};
use crate::ranker::Candidate;

/// Row counts for health and stats reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StoreStats {
    pub products: i64,
    pub embeddings: i64,
    pub sessions: i64,
    pub interactions: i64,
    pub search_logs: i64,
}

/// Abstract storage backend.
///
/// | Group | Methods |
/// |-------|---------|
/// | Products | `upsert_product`, `get_product`, `delete_product`, `candidate_products`, `featured_products`, `products_in_category`, `products_with_embedding_state` |
/// | Embeddings | `upsert_embedding`, `get_embedding`, `delete_embedding`, `clear_embeddings` |
/// | Sessions | `get_session`, `touch_session`, `append_interaction`, `recent_interactions`, `recently_viewed` |
/// | Weights | `active_weights`, `ensure_active_weights`, `activate_weights` |
/// | Audit | `record_search`, `get_search_log`, `list_search_logs`, `explanations_for`, `mark_result_clicked`, `insert_metric`, `list_metrics` |
/// | Jobs | `create_job`, `get_job`, `update_job` |
/// | Ops | `stats` |
#[async_trait]
pub trait Store: Send + Sync {
    // ---- products ----

    /// Insert or update a product by id. A duplicate sku on a different
    /// product is a `Conflict`.
    async fn upsert_product(&self, product: &Product) -> Result<Product>;

    async fn get_product(&self, id: i64) -> Result<Option<Product>>;

    /// Delete a product and its embedding. Returns false when absent.
    async fn delete_product(&self, id: i64) -> Result<bool>;

    /// The bounded candidate pool for ranking: up to `limit` most-recent
    /// products, each with its stored vector when one exists.
    async fn candidate_products(&self, limit: usize) -> Result<Vec<Candidate>>;

    /// Featured products ordered by rating descending (cold start,
    /// trending, degraded responses).
    async fn featured_products(&self, limit: usize) -> Result<Vec<Product>>;

    /// Products sharing a category, excluding one id (similar-product
    /// fallback when the target has no embedding).
    async fn products_in_category(
        &self,
        category: &str,
        exclude_id: i64,
        limit: usize,
    ) -> Result<Vec<Product>>;

    /// All products with the source hash of their current embedding, if
    /// any — the batch pipeline decides which are missing or stale.
    async fn products_with_embedding_state(&self) -> Result<Vec<(Product, Option<String>)>>;

    // ---- embeddings ----

    /// Idempotent upsert keyed by product id.
    async fn upsert_embedding(&self, embedding: &StoredEmbedding) -> Result<()>;

    async fn get_embedding(&self, product_id: i64) -> Result<Option<StoredEmbedding>>;

    async fn delete_embedding(&self, product_id: i64) -> Result<bool>;

    /// Drop all embeddings (full rebuild). Returns the number removed.
    async fn clear_embeddings(&self) -> Result<i64>;

    // ---- sessions & interactions ----

    async fn get_session(&self, id: &str) -> Result<Option<Session>>;

    /// Create the session row on first contact (30-day expiry) or update
    /// `last_active_at` on subsequent ones.
    async fn touch_session(&self, id: &str, now: i64) -> Result<Session>;

    /// Append one interaction event; the store assigns the id. Ordering is
    /// by server timestamp with ties broken by insertion order.
    async fn append_interaction(&self, interaction: &Interaction) -> Result<Interaction>;

    /// Most-recent-first interactions for a session.
    async fn recent_interactions(&self, session_id: &str, limit: usize)
        -> Result<Vec<Interaction>>;

    /// Distinct product ids from `view` events, most-recent-first.
    async fn recently_viewed(&self, session_id: &str, limit: usize) -> Result<Vec<i64>>;

    // ---- ranking weights ----

    async fn active_weights(&self) -> Result<Option<RankingWeights>>;

    /// Return the active weights, materializing `defaults` as the active
    /// row when none exists. Upsert-and-return: at most one insertion, no
    /// re-read loop.
    async fn ensure_active_weights(&self, defaults: &RankingWeights) -> Result<RankingWeights>;

    /// Persist a new weight row and make it the single active one.
    async fn activate_weights(&self, weights: &RankingWeights) -> Result<RankingWeights>;

    // ---- search audit ----

    /// Persist a search log and its per-result explanations in one
    /// transaction. Returns the log with its assigned id.
    async fn record_search(
        &self,
        log: &SearchLog,
        explanations: &[ResultExplanation],
    ) -> Result<SearchLog>;

    async fn get_search_log(&self, id: i64) -> Result<Option<SearchLog>>;

    /// Most-recent-first search logs.
    async fn list_search_logs(&self, limit: usize) -> Result<Vec<SearchLog>>;

    /// Explanations for a log, ordered by result position.
    async fn explanations_for(&self, search_log_id: i64) -> Result<Vec<ResultExplanation>>;

    /// Mark the explanation row for (latest log of session+query, product)
    /// as clicked. Returns whether a row was updated.
    async fn mark_result_clicked(
        &self,
        session_id: &str,
        query: &str,
        product_id: i64,
    ) -> Result<bool>;

    async fn insert_metric(&self, metric: &EvaluationMetric) -> Result<EvaluationMetric>;

    async fn list_metrics(&self, limit: usize) -> Result<Vec<EvaluationMetric>>;

    // ---- upload jobs ----

    async fn create_job(&self, filename: &str, now: i64) -> Result<UploadJob>;

    async fn get_job(&self, id: i64) -> Result<Option<UploadJob>>;

    /// Persist job progress. Status changes must follow the monotonic
    /// transition table ([`crate::models::JobStatus::can_transition`]);
    /// illegal transitions are a `Conflict`.
    async fn update_job(&self, job: &UploadJob) -> Result<()>;

    // ---- ops ----

    async fn stats(&self) -> Result<StoreStats>;
}
