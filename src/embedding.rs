//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and two backends:
//!
//! - **[`HttpProvider`]** — calls the sentence-embedding sidecar
//!   (`/embed`, `/embed/batch`) with retry and backoff. The first call
//!   tolerates a long timeout while the sidecar loads its model; once a
//!   request has succeeded the timeout drops to the warm bound.
//! - **[`DeterministicProvider`]** — the pure fallback construction from
//!   [`shopsense_core::embedding::fallback_vector`]; used in development
//!   and whenever the sidecar is unreachable.
//!
//! Both guarantee unit-normalized vectors of the configured dimension.
//!
//! # Retry Strategy
//!
//! HTTP 429 and 5xx responses and network errors retry with exponential
//! backoff (1s, 2s, 4s, … capped at 2^5); other 4xx responses fail
//! immediately. Exhausted retries surface as the `unavailable` error kind,
//! which the search orchestrator treats as a signal to degrade, not fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use shopsense_core::embedding::{fallback_vector, l2_normalize};
use shopsense_core::error::{Error, Result};

use crate::config::EmbeddingConfig;

/// An embedding backend. Implementations return unit-normalized vectors
/// of dimension [`dims`](EmbeddingProvider::dims).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded alongside stored embeddings.
    fn model_name(&self) -> &str;

    /// Vector dimensionality (reference deployment: 384).
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl std::fmt::Debug for dyn EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("model_name", &self.model_name())
            .field("dims", &self.dims())
            .finish()
    }
}

/// Create the provider named in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "http" => Ok(Box::new(HttpProvider::new(config)?)),
        "deterministic" => Ok(Box::new(DeterministicProvider::new(config))),
        other => Err(Error::InvalidInput(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

// ============ Deterministic provider ============

/// Pure text→vector provider. Stable across restarts and processes; its
/// cosine scores are weak, which the ranker's keyword boost compensates.
pub struct DeterministicProvider {
    dims: usize,
}

impl DeterministicProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self { dims: config.dims }
    }

    pub fn with_dims(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingProvider for DeterministicProvider {
    fn model_name(&self) -> &str {
        "deterministic"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(fallback_vector(text, self.dims))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| fallback_vector(t, self.dims)).collect())
    }
}

// ============ HTTP provider ============

/// Provider backed by the sentence-embedding sidecar service.
pub struct HttpProvider {
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
    cold_timeout: Duration,
    warm_timeout: Duration,
    /// Set after the first successful response; switches to the warm timeout.
    warmed: AtomicBool,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl HttpProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.service_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dims: config.dims,
            max_retries: config.max_retries,
            cold_timeout: Duration::from_secs(config.cold_timeout_secs),
            warm_timeout: Duration::from_secs(config.warm_timeout_secs),
            warmed: AtomicBool::new(false),
            client,
        })
    }

    fn request_timeout(&self) -> Duration {
        if self.warmed.load(Ordering::Relaxed) {
            self.warm_timeout
        } else {
            self.cold_timeout
        }
    }

    async fn post_with_retry(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .timeout(self.request_timeout())
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        self.warmed.store(true, Ordering::Relaxed);
                        return response.json().await.map_err(|e| {
                            Error::Unavailable(format!("malformed embedding response: {e}"))
                        });
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let text = response.text().await.unwrap_or_default();
                        last_err = Some(Error::Unavailable(format!(
                            "embedding service error {status}: {text}"
                        )));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let text = response.text().await.unwrap_or_default();
                    return Err(Error::Unavailable(format!(
                        "embedding service rejected request ({status}): {text}"
                    )));
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(Error::Timeout(format!(
                        "embedding service timed out at {url}"
                    )));
                    continue;
                }
                Err(e) => {
                    last_err = Some(Error::Unavailable(format!(
                        "embedding service unreachable (is it running at {url}?): {e}"
                    )));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Unavailable("embedding failed after retries".into())))
    }

    fn check_and_normalize(&self, mut vector: Vec<f32>) -> Result<Vec<f32>> {
        if vector.len() != self.dims {
            return Err(Error::Internal(format!(
                "embedding service returned dimension {}, expected {}",
                vector.len(),
                self.dims
            )));
        }
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let json = self
            .post_with_retry("/embed", serde_json::json!({ "text": text }))
            .await?;
        let parsed: EmbedResponse = serde_json::from_value(json)
            .map_err(|e| Error::Unavailable(format!("malformed embedding response: {e}")))?;
        self.check_and_normalize(parsed.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let json = self
            .post_with_retry("/embed/batch", serde_json::json!({ "texts": texts }))
            .await?;
        let parsed: BatchEmbedResponse = serde_json::from_value(json)
            .map_err(|e| Error::Unavailable(format!("malformed batch response: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(Error::Internal(format!(
                "embedding batch returned {} vectors for {} texts",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        parsed
            .embeddings
            .into_iter()
            .map(|v| self.check_and_normalize(v))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopsense_core::embedding::is_unit_norm;

    #[tokio::test]
    async fn deterministic_provider_is_stable() {
        let provider = DeterministicProvider::with_dims(128);
        let a = provider.embed("wireless headphones").await.unwrap();
        let b = provider.embed("wireless headphones").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert!(is_unit_norm(&a));
    }

    #[tokio::test]
    async fn deterministic_batch_matches_single() {
        let provider = DeterministicProvider::with_dims(64);
        let single = provider.embed("garden hose").await.unwrap();
        let batch = provider
            .embed_batch(&["garden hose".to_string(), "desk lamp".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], single);
        assert_ne!(batch[0], batch[1]);
    }

    #[test]
    fn create_provider_rejects_unknown() {
        let mut config = EmbeddingConfig::default();
        config.provider = "magic".to_string();
        let err = create_provider(&config).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn http_provider_dimension_check() {
        let config = EmbeddingConfig {
            dims: 3,
            ..Default::default()
        };
        let provider = HttpProvider::new(&config).unwrap();
        assert!(provider.check_and_normalize(vec![1.0, 2.0, 2.0]).is_ok());
        let err = provider.check_and_normalize(vec![1.0, 2.0]).unwrap_err();
        assert_eq!(err.kind(), "internal");
    }

    #[test]
    fn http_provider_normalizes_service_output() {
        let config = EmbeddingConfig {
            dims: 2,
            ..Default::default()
        };
        let provider = HttpProvider::new(&config).unwrap();
        let v = provider.check_and_normalize(vec![3.0, 4.0]).unwrap();
        assert!(is_unit_norm(&v));
    }
}
