//! Core data models for the discovery engine.
//!
//! These types represent the catalog, interaction, and audit rows that flow
//! through the search and recommendation pipeline. The data lifecycle is:
//!
//! ```text
//! Loader → Product → embed() → StoredEmbedding
//!                                    ↓
//!                    query → rank() → SearchLog + ResultExplanation
//!                                    ↓
//!              Interaction → recommend() / evaluate() → EvaluationMetric
//! ```
//!
//! All timestamps are Unix epoch seconds (`i64`) for efficient comparison
//! and indexing; persisted vectors are JSON arrays of `f32`.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sessions expire 30 days after issuance.
pub const SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Product texts are truncated to this length before embedding, and the
/// truncated text is persisted for audit.
pub const EMBED_TEXT_MAX_CHARS: usize = 1000;

/// Queries longer than this are rejected with `InvalidInput`.
pub const QUERY_MAX_CHARS: usize = 500;

/// Inventory availability states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    InStock,
    LowStock,
    OutOfStock,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::InStock => "in_stock",
            Availability::LowStock => "low_stock",
            Availability::OutOfStock => "out_of_stock",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "in_stock" => Ok(Availability::InStock),
            "low_stock" => Ok(Availability::LowStock),
            "out_of_stock" => Ok(Availability::OutOfStock),
            other => Err(Error::InvalidInput(format!(
                "unknown availability: {other}"
            ))),
        }
    }
}

/// A catalog product.
///
/// | Field group | Fields |
/// |-------------|--------|
/// | Identity | `id`, `sku` |
/// | Descriptive | `title`, `description`, `category`, `subcategory`, `brand`, `features` |
/// | Commercial | `price`, `original_price`, `currency` |
/// | Quality | `rating` (0–5, nullable), `review_count` |
/// | Inventory | `availability`, `stock_quantity` |
/// | Presentation | `image_url`, `featured` |
/// | Lifecycle | `created_at`, `updated_at` |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: Option<String>,
    pub title: String,
    pub description: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub features: Vec<String>,
    pub price: f64,
    pub original_price: Option<f64>,
    pub currency: String,
    pub rating: Option<f64>,
    pub review_count: i64,
    pub availability: Availability,
    pub stock_quantity: i64,
    pub image_url: Option<String>,
    pub featured: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Product {
    /// Validate the row invariants before persisting.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::InvalidInput("product title must not be empty".into()));
        }
        if self.price < 0.0 {
            return Err(Error::InvalidInput("price must be non-negative".into()));
        }
        if let Some(orig) = self.original_price {
            if orig < self.price {
                return Err(Error::InvalidInput(
                    "original_price must be >= price".into(),
                ));
            }
        }
        if let Some(r) = self.rating {
            if !(0.0..=5.0).contains(&r) {
                return Err(Error::InvalidInput("rating must be in [0, 5]".into()));
            }
        }
        if self.stock_quantity < 0 {
            return Err(Error::InvalidInput(
                "stock_quantity must be non-negative".into(),
            ));
        }
        Ok(())
    }

    /// The text that gets embedded for this product, truncated for audit.
    pub fn embedding_text(&self) -> String {
        let text = format!("{} {} {}", self.title, self.description, self.category);
        text.chars().take(EMBED_TEXT_MAX_CHARS).collect()
    }

    /// Lowercased haystack used for matched-term extraction and keyword
    /// fallback: `title + description + category`.
    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.category).to_lowercase()
    }
}

/// A stored product embedding. One per product id; idempotent upsert.
///
/// The vector is L2-normalized to unit length (|v|₂ = 1 ± 1e-6) so cosine
/// reduces to dot product. `source_hash` detects stale embeddings when the
/// product's descriptive text changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub product_id: i64,
    pub vector: Vec<f32>,
    /// The text that was embedded, truncated to [`EMBED_TEXT_MAX_CHARS`].
    pub source_text: String,
    /// SHA-256 of `source_text`, for staleness detection.
    pub source_hash: String,
    pub model: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An anonymous session. The id is opaque and issued by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: i64,
    pub last_active_at: i64,
    pub expires_at: i64,
}

impl Session {
    /// Expired sessions are ignored for recommendation purposes; their
    /// interactions are retained for aggregate analytics.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Kinds of user interaction, ordered by purchase-intent strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Click,
    SearchClick,
    AddToCart,
    Purchase,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Click => "click",
            InteractionKind::SearchClick => "search_click",
            InteractionKind::AddToCart => "add_to_cart",
            InteractionKind::Purchase => "purchase",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "view" => Ok(InteractionKind::View),
            "click" => Ok(InteractionKind::Click),
            "search_click" => Ok(InteractionKind::SearchClick),
            "add_to_cart" => Ok(InteractionKind::AddToCart),
            "purchase" => Ok(InteractionKind::Purchase),
            other => Err(Error::InvalidInput(format!(
                "unknown interaction kind: {other}"
            ))),
        }
    }

    /// Base affinity weight used by the session recommender.
    pub fn base_weight(&self) -> f64 {
        match self {
            InteractionKind::Purchase => 5.0,
            InteractionKind::AddToCart => 4.0,
            InteractionKind::SearchClick => 3.0,
            InteractionKind::Click => 2.0,
            InteractionKind::View => 1.0,
        }
    }
}

/// An append-only interaction event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: i64,
    pub session_id: String,
    pub product_id: i64,
    pub kind: InteractionKind,
    pub query: Option<String>,
    /// 1-based result position, when the interaction came from a result list.
    pub position: Option<i64>,
    pub created_at: i64,
}

/// The five coefficients of the linear re-ranker, plus lifecycle metadata.
///
/// Exactly one row is active at any time. Weights are not required to sum
/// to 1; scores remain comparable within a single query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingWeights {
    pub id: i64,
    pub label: String,
    /// Semantic similarity weight.
    pub alpha: f64,
    /// Rating weight.
    pub beta: f64,
    /// Price competitiveness weight.
    pub gamma: f64,
    /// Stock availability weight.
    pub delta: f64,
    /// Recency weight.
    pub epsilon: f64,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RankingWeights {
    /// The default weight tuple, materialized when no active row exists.
    pub fn default_tuple() -> (f64, f64, f64, f64, f64) {
        (0.50, 0.20, 0.15, 0.10, 0.05)
    }

    pub fn with_defaults(now: i64) -> Self {
        let (alpha, beta, gamma, delta, epsilon) = Self::default_tuple();
        Self {
            id: 0,
            label: "default".to_string(),
            alpha,
            beta,
            gamma,
            delta,
            epsilon,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
            ("delta", self.delta),
            ("epsilon", self.epsilon),
        ] {
            if v < 0.0 || !v.is_finite() {
                return Err(Error::InvalidInput(format!(
                    "weight {name} must be a non-negative number"
                )));
            }
        }
        Ok(())
    }

    /// Operators are warned (not prevented) when weights do not sum to 1.
    pub fn sum(&self) -> f64 {
        self.alpha + self.beta + self.gamma + self.delta + self.epsilon
    }
}

/// One row per executed query, for audit and offline evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchLog {
    pub id: i64,
    pub session_id: String,
    pub query: String,
    /// The query embedding that produced this ranking (JSON array of floats
    /// when persisted).
    pub query_vector: Vec<f32>,
    pub result_count: i64,
    pub response_time_ms: i64,
    /// Serialized filter bag. Keyword-fallback responses carry a
    /// `"fallback": "keyword"` marker here so they can be told apart.
    pub filters_json: String,
    pub created_at: i64,
}

/// Per-result score decomposition persisted alongside a [`SearchLog`].
///
/// Scores are rounded to six decimal places at persistence time so a replay
/// of the logged query reproduces them byte-for-byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultExplanation {
    pub id: i64,
    pub search_log_id: i64,
    pub product_id: i64,
    /// 1-based rank in the response.
    pub position: i64,
    pub final_score: f64,
    pub semantic_score: f64,
    pub rating_score: f64,
    pub price_score: f64,
    pub stock_score: f64,
    pub recency_score: f64,
    pub matched_terms: Vec<String>,
    pub explanation: String,
    /// Set post-hoc by the session tracker when the user clicks this result.
    pub was_clicked: bool,
}

/// Metric kinds produced by the offline evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    NdcgAt10,
    RecallAt10,
    PrecisionAt10,
    Mrr,
    Custom,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::NdcgAt10 => "ndcg@10",
            MetricKind::RecallAt10 => "recall@10",
            MetricKind::PrecisionAt10 => "precision@10",
            MetricKind::Mrr => "mrr",
            MetricKind::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ndcg@10" => Ok(MetricKind::NdcgAt10),
            "recall@10" => Ok(MetricKind::RecallAt10),
            "precision@10" => Ok(MetricKind::PrecisionAt10),
            "mrr" => Ok(MetricKind::Mrr),
            "custom" => Ok(MetricKind::Custom),
            other => Err(Error::InvalidInput(format!("unknown metric kind: {other}"))),
        }
    }
}

/// A persisted evaluation measurement, per search log or aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationMetric {
    pub id: i64,
    /// `None` for aggregate rows spanning many queries.
    pub search_log_id: Option<i64>,
    pub kind: MetricKind,
    pub value: f64,
    pub query_count: Option<i64>,
    /// Free text; also used to correlate per-query metrics back to logs.
    pub note: Option<String>,
    pub created_at: i64,
}

/// Batch-import lifecycle states. Transitions are monotonic; the only
/// recoverable re-entry after `Failed` is a fresh job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Embedding,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Embedding => "embedding",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "embedding" => Ok(JobStatus::Embedding),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown job status: {other}"))),
        }
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Embedding)
                | (Embedding, Completed)
                | (Pending, Failed)
                | (Processing, Failed)
                | (Embedding, Failed)
        )
    }
}

/// Observability row for a batch catalog import. The loader itself is
/// external; the engine drives the `Embedding` stage and the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: i64,
    pub filename: String,
    pub status: JobStatus,
    pub total_products: i64,
    pub processed_products: i64,
    pub embedded_products: i64,
    pub error: Option<String>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

/// Filters applied to the candidate set before ranking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub in_stock_only: bool,
    /// Overrides the ranker's minimum-score threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f64>,
}

impl SearchFilters {
    /// Whether a product passes the category/price/stock filters.
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(ref cat) = self.category {
            if !product
                .category
                .to_lowercase()
                .contains(&cat.to_lowercase())
            {
                return false;
            }
        }
        if let Some(min) = self.min_price {
            if product.price < min {
                return false;
            }
        }
        if let Some(max) = self.max_price {
            if product.price > max {
                return false;
            }
        }
        if self.in_stock_only && product.availability != Availability::InStock {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn product(id: i64, title: &str) -> Product {
        Product {
            id,
            sku: None,
            title: title.to_string(),
            description: String::new(),
            category: "general".to_string(),
            subcategory: None,
            brand: None,
            features: Vec::new(),
            price: 10.0,
            original_price: None,
            currency: "USD".to_string(),
            rating: None,
            review_count: 0,
            availability: Availability::InStock,
            stock_quantity: 10,
            image_url: None,
            featured: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn validate_rejects_empty_title() {
        let p = product(1, "  ");
        assert!(matches!(p.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn validate_rejects_discounted_original_price() {
        let mut p = product(1, "Widget");
        p.price = 20.0;
        p.original_price = Some(15.0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_rating() {
        let mut p = product(1, "Widget");
        p.rating = Some(5.5);
        assert!(p.validate().is_err());
        p.rating = Some(5.0);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn embedding_text_truncates_to_audit_limit() {
        let mut p = product(1, "Widget");
        p.description = "x".repeat(2000);
        assert_eq!(p.embedding_text().chars().count(), EMBED_TEXT_MAX_CHARS);
    }

    #[test]
    fn interaction_weights_rank_purchase_highest() {
        assert!(
            InteractionKind::Purchase.base_weight() > InteractionKind::AddToCart.base_weight()
        );
        assert_eq!(InteractionKind::View.base_weight(), 1.0);
    }

    #[test]
    fn session_expiry() {
        let s = Session {
            id: "abc".into(),
            created_at: 0,
            last_active_at: 0,
            expires_at: SESSION_TTL_SECS,
        };
        assert!(!s.is_expired(SESSION_TTL_SECS - 1));
        assert!(s.is_expired(SESSION_TTL_SECS));
    }

    #[test]
    fn job_transitions_are_monotonic() {
        use JobStatus::*;
        assert!(Pending.can_transition(Processing));
        assert!(Processing.can_transition(Embedding));
        assert!(Embedding.can_transition(Completed));
        assert!(Processing.can_transition(Failed));
        assert!(!Completed.can_transition(Processing));
        assert!(!Failed.can_transition(Embedding));
        assert!(!Embedding.can_transition(Processing));
    }

    #[test]
    fn filters_match_category_and_price() {
        let mut p = product(1, "Desk Lamp");
        p.category = "Home & Office".to_string();
        p.price = 45.0;

        let filters = SearchFilters {
            category: Some("office".to_string()),
            min_price: Some(40.0),
            max_price: Some(50.0),
            ..Default::default()
        };
        assert!(filters.matches(&p));

        let filters = SearchFilters {
            max_price: Some(30.0),
            ..Default::default()
        };
        assert!(!filters.matches(&p));
    }

    #[test]
    fn in_stock_filter_excludes_low_stock() {
        let mut p = product(1, "Widget");
        p.availability = Availability::LowStock;
        let filters = SearchFilters {
            in_stock_only: true,
            ..Default::default()
        };
        assert!(!filters.matches(&p));
    }

    #[test]
    fn default_weights_tuple() {
        let w = RankingWeights::with_defaults(0);
        assert_eq!(
            (w.alpha, w.beta, w.gamma, w.delta, w.epsilon),
            (0.50, 0.20, 0.15, 0.10, 0.05)
        );
        assert!(w.active);
        assert!((w.sum() - 1.0).abs() < 1e-12);
    }
}
