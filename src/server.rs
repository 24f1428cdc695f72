//! JSON HTTP server exposing the discovery engine.
//!
//! The engine itself is transport-independent; this is thin glue for
//! development and for front ends that speak JSON. Session identity
//! arrives as an opaque `session_id` in the request body (cookie issuance
//! belongs to the outer transport) — requests without one get a freshly
//! minted id back in the response.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/search` | Ranked, filtered, explained product search |
//! | `POST` | `/similar` | Products similar to a given one |
//! | `POST` | `/recommendations` | Session-based recommendations |
//! | `GET`  | `/trending` | Trending products (`?limit=N`) |
//! | `POST` | `/interactions` | Record a view/click/cart/purchase event |
//! | `GET`  | `/admin/weights` | Active ranking weights + public formula |
//! | `PUT`  | `/admin/weights` | Activate a new weight tuple |
//! | `POST` | `/admin/products` | Create or update a product |
//! | `POST` | `/admin/products/delete` | Delete a product |
//! | `POST` | `/admin/products/reembed` | Regenerate one embedding |
//! | `POST` | `/admin/metrics/calculate` | Run the offline evaluator |
//! | `GET`  | `/admin/logs` | Recent search logs (`?limit=N`) |
//! | `GET`  | `/health` | Health check with store row counts |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_input", "message": "query must not be empty" } }
//! ```
//!
//! The `code` field carries the engine's stable error kind
//! (`invalid_input`, `unavailable`, `not_found`, `conflict`, `cancelled`,
//! `timeout`, `internal`).

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use shopsense_core::error::Error;
use shopsense_core::models::{Product, RankingWeights, SearchFilters, SearchLog};
use shopsense_core::recommend::{for_session, similar, trending, Recommendation};
use shopsense_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::eval_cmd::{evaluate_logged_queries, EvalSummary};
use crate::interactions::{mint_session_id, record_interaction};
use crate::products::{regenerate_embedding, upsert_with_embedding};
use crate::search::{execute_search_bounded, SearchRequest, SearchResponse};
use crate::sqlite_store::SqliteStore;
use crate::weights::{apply_update, WeightsCache, RANKING_FORMULA};

/// Shared application state.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    store: Arc<SqliteStore>,
    provider: Arc<dyn EmbeddingProvider>,
    weights_cache: Arc<WeightsCache>,
}

/// Start the HTTP server on the configured bind address.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(SqliteStore::new(pool)),
        provider: Arc::from(create_provider(&config.embedding)?),
        weights_cache: Arc::new(WeightsCache::from_config(config)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/search", post(handle_search))
        .route("/similar", post(handle_similar))
        .route("/recommendations", post(handle_recommendations))
        .route("/trending", get(handle_trending))
        .route("/interactions", post(handle_interaction))
        .route(
            "/admin/weights",
            get(handle_weights_get).put(handle_weights_update),
        )
        .route("/admin/products", post(handle_product_upsert))
        .route("/admin/products/delete", post(handle_product_delete))
        .route("/admin/products/reembed", post(handle_product_reembed))
        .route("/admin/metrics/calculate", post(handle_metrics_calculate))
        .route("/admin/logs", get(handle_logs))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    let bind_addr = config.server.bind.clone();
    println!("shopsense listening on http://{bind_addr}");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout(_) | Error::Cancelled(_) => StatusCode::REQUEST_TIMEOUT,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchBody {
    /// Opaque session id; minted when absent.
    session_id: Option<String>,
    query: String,
    #[serde(default)]
    filters: SearchFilters,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchEnvelope {
    session_id: String,
    #[serde(flatten)]
    response: SearchResponse,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchEnvelope>, AppError> {
    let session_id = body.session_id.unwrap_or_else(mint_session_id);
    let request = SearchRequest {
        session_id: session_id.clone(),
        query: body.query,
        filters: body.filters,
        limit: body.limit,
    };

    let response = execute_search_bounded(
        state.store.as_ref(),
        state.provider.as_ref(),
        &state.weights_cache,
        &state.config,
        &request,
    )
    .await?;

    Ok(Json(SearchEnvelope {
        session_id,
        response,
    }))
}

// ============ POST /similar ============

#[derive(Deserialize)]
struct SimilarBody {
    product_id: i64,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct RecommendationsResponse {
    results: Vec<Recommendation>,
}

async fn handle_similar(
    State(state): State<AppState>,
    Json(body): Json<SimilarBody>,
) -> Result<Json<RecommendationsResponse>, AppError> {
    let limit = body.limit.unwrap_or(5);
    if !(1..=20).contains(&limit) {
        return Err(Error::InvalidInput("limit must be in 1..=20".into()).into());
    }

    let results = similar(state.store.as_ref(), body.product_id, limit).await?;
    Ok(Json(RecommendationsResponse { results }))
}

// ============ POST /recommendations ============

#[derive(Deserialize)]
struct RecommendationsBody {
    session_id: String,
    limit: Option<usize>,
    #[serde(default)]
    exclude_product_ids: Vec<i64>,
}

async fn handle_recommendations(
    State(state): State<AppState>,
    Json(body): Json<RecommendationsBody>,
) -> Result<Json<RecommendationsResponse>, AppError> {
    let limit = body.limit.unwrap_or(10);
    if !(1..=50).contains(&limit) {
        return Err(Error::InvalidInput("limit must be in 1..=50".into()).into());
    }

    let now = chrono::Utc::now().timestamp();
    let results = for_session(
        state.store.as_ref(),
        &body.session_id,
        limit,
        &body.exclude_product_ids,
        now,
    )
    .await?;
    Ok(Json(RecommendationsResponse { results }))
}

// ============ GET /trending ============

#[derive(Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

async fn handle_trending(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<RecommendationsResponse>, AppError> {
    let limit = params.limit.unwrap_or(10).clamp(1, 50);
    let results = trending(state.store.as_ref(), limit).await?;
    Ok(Json(RecommendationsResponse { results }))
}

// ============ POST /interactions ============

#[derive(Deserialize)]
struct InteractionBody {
    session_id: String,
    product_id: i64,
    kind: String,
    query: Option<String>,
    position: Option<i64>,
}

#[derive(Serialize)]
struct InteractionResponse {
    id: i64,
    session_id: String,
}

async fn handle_interaction(
    State(state): State<AppState>,
    Json(body): Json<InteractionBody>,
) -> Result<Json<InteractionResponse>, AppError> {
    let kind = shopsense_core::models::InteractionKind::parse(&body.kind)?;
    let stored = record_interaction(
        state.store.as_ref(),
        &body.session_id,
        body.product_id,
        kind,
        body.query,
        body.position,
    )
    .await?;
    Ok(Json(InteractionResponse {
        id: stored.id,
        session_id: stored.session_id,
    }))
}

// ============ /admin/weights ============

#[derive(Serialize)]
struct WeightsResponse {
    weights: RankingWeights,
    formula: &'static str,
}

async fn handle_weights_get(
    State(state): State<AppState>,
) -> Result<Json<WeightsResponse>, AppError> {
    let now = chrono::Utc::now().timestamp();
    let weights = state
        .store
        .ensure_active_weights(&state.config.default_weights(now))
        .await?;
    Ok(Json(WeightsResponse {
        weights,
        formula: RANKING_FORMULA,
    }))
}

#[derive(Deserialize)]
struct WeightsUpdateBody {
    alpha: f64,
    beta: f64,
    gamma: f64,
    delta: f64,
    epsilon: f64,
    label: Option<String>,
}

async fn handle_weights_update(
    State(state): State<AppState>,
    Json(body): Json<WeightsUpdateBody>,
) -> Result<Json<WeightsResponse>, AppError> {
    let now = chrono::Utc::now().timestamp();
    let weights = RankingWeights {
        id: 0,
        label: body.label.unwrap_or_else(|| "admin".to_string()),
        alpha: body.alpha,
        beta: body.beta,
        gamma: body.gamma,
        delta: body.delta,
        epsilon: body.epsilon,
        active: true,
        created_at: now,
        updated_at: now,
    };

    let stored = apply_update(state.store.as_ref(), &state.weights_cache, weights).await?;
    Ok(Json(WeightsResponse {
        weights: stored,
        formula: RANKING_FORMULA,
    }))
}

// ============ /admin/products ============

#[derive(Serialize)]
struct ProductUpsertResponse {
    id: i64,
    embedded: bool,
}

async fn handle_product_upsert(
    State(state): State<AppState>,
    Json(product): Json<Product>,
) -> Result<Json<ProductUpsertResponse>, AppError> {
    let embedded =
        upsert_with_embedding(state.store.as_ref(), state.provider.as_ref(), &product).await?;
    Ok(Json(ProductUpsertResponse {
        id: product.id,
        embedded,
    }))
}

#[derive(Deserialize)]
struct ProductIdBody {
    id: i64,
}

#[derive(Serialize)]
struct DeletedResponse {
    deleted: bool,
}

async fn handle_product_delete(
    State(state): State<AppState>,
    Json(body): Json<ProductIdBody>,
) -> Result<Json<DeletedResponse>, AppError> {
    let deleted = state.store.delete_product(body.id).await?;
    Ok(Json(DeletedResponse { deleted }))
}

#[derive(Serialize)]
struct ReembedResponse {
    id: i64,
}

async fn handle_product_reembed(
    State(state): State<AppState>,
    Json(body): Json<ProductIdBody>,
) -> Result<Json<ReembedResponse>, AppError> {
    regenerate_embedding(state.store.as_ref(), state.provider.as_ref(), body.id).await?;
    Ok(Json(ReembedResponse { id: body.id }))
}

// ============ /admin/metrics/calculate ============

#[derive(Deserialize)]
struct MetricsBody {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct MetricsResponse {
    summary: Option<EvalSummary>,
}

async fn handle_metrics_calculate(
    State(state): State<AppState>,
    Json(body): Json<MetricsBody>,
) -> Result<Json<MetricsResponse>, AppError> {
    let limit = body.limit.unwrap_or(500);
    let summary = evaluate_logged_queries(state.store.as_ref(), limit).await?;
    Ok(Json(MetricsResponse { summary }))
}

// ============ GET /admin/logs ============

#[derive(Serialize)]
struct LogsResponse {
    logs: Vec<SearchLog>,
}

async fn handle_logs(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Result<Json<LogsResponse>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let logs = state.store.list_search_logs(limit).await?;
    Ok(Json(LogsResponse { logs }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    products: i64,
    embeddings: i64,
}

async fn handle_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let stats = state.store.stats().await?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        products: stats.products,
        embeddings: stats.embeddings,
    }))
}
