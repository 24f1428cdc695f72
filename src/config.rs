//! TOML configuration with environment overrides.
//!
//! Every field has a default, so a partial (or absent) config file is
//! fine. Three environment variables override the file after parsing:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `DATABASE_URL` | `[db] path` (a path or `sqlite:` URL) |
//! | `EMBEDDING_SERVICE_URL` | `[embedding] service_url` |
//! | `DEFAULT_WEIGHTS` | the materialized default weight tuple, as `α,β,γ,δ,ε` |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use shopsense_core::models::RankingWeights;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Overrides the default weight tuple materialized when the weights
    /// table has no active row.
    #[serde(default)]
    pub default_weights: Option<[f64; 5]>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Pool size. The CLI needs very few connections; widen this for
    /// server deployments.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/shopsense.sqlite")
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"http"` (sentence-embedding sidecar) or `"deterministic"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_service_url")]
    pub service_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Timeout before the sidecar has served its first request (model load).
    #[serde(default = "default_cold_timeout")]
    pub cold_timeout_secs: u64,
    #[serde(default = "default_warm_timeout")]
    pub warm_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            service_url: default_service_url(),
            model: default_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            cold_timeout_secs: default_cold_timeout(),
            warm_timeout_secs: default_warm_timeout(),
        }
    }
}

fn default_provider() -> String {
    "http".to_string()
}
fn default_service_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_cold_timeout() -> u64 {
    60
}
fn default_warm_timeout() -> u64 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Bound on the candidate pool fetched per query.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_result_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Minimum final score (θ) unless the request overrides it.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Embedding soft deadline; beyond it the search degrades to the
    /// deterministic vector.
    #[serde(default = "default_soft_deadline")]
    pub soft_deadline_ms: u64,
    /// Whole-search hard deadline, enforced by the serving layer.
    #[serde(default = "default_hard_deadline")]
    pub hard_deadline_ms: u64,
    /// TTL of the active-weights cache.
    #[serde(default = "default_weights_ttl")]
    pub weights_cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            default_limit: default_result_limit(),
            max_limit: default_max_limit(),
            min_score: default_min_score(),
            soft_deadline_ms: default_soft_deadline(),
            hard_deadline_ms: default_hard_deadline(),
            weights_cache_ttl_secs: default_weights_ttl(),
        }
    }
}

fn default_candidate_limit() -> usize {
    5000
}
fn default_result_limit() -> usize {
    20
}
fn default_max_limit() -> usize {
    50
}
fn default_min_score() -> f64 {
    0.1
}
fn default_soft_deadline() -> u64 {
    500
}
fn default_hard_deadline() -> u64 {
    1500
}
fn default_weights_ttl() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7399".to_string()
}

impl Config {
    /// The weight tuple materialized when no active row exists:
    /// `DEFAULT_WEIGHTS` env, then `default_weights` from the file, then
    /// the built-in (0.50, 0.20, 0.15, 0.10, 0.05).
    pub fn default_weights(&self, now: i64) -> RankingWeights {
        let mut weights = RankingWeights::with_defaults(now);
        if let Some([a, b, g, d, e]) = self.default_weights {
            weights.alpha = a;
            weights.beta = b;
            weights.gamma = g;
            weights.delta = d;
            weights.epsilon = e;
            weights.label = "configured".to_string();
        }
        weights
    }
}

/// Load the configuration. `None` yields built-in defaults; an unreadable
/// or invalid file is a hard error (startup exit code 1). Environment
/// overrides are applied last.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse config file")?
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        let path = url.strip_prefix("sqlite:").unwrap_or(&url);
        config.db.path = PathBuf::from(path);
    }
    if let Ok(url) = std::env::var("EMBEDDING_SERVICE_URL") {
        config.embedding.service_url = url;
    }
    if let Ok(raw) = std::env::var("DEFAULT_WEIGHTS") {
        config.default_weights = Some(parse_weights(&raw)?);
    }
    Ok(())
}

/// Parse a `DEFAULT_WEIGHTS` value: five comma-separated non-negative
/// decimals, `α,β,γ,δ,ε`.
pub fn parse_weights(raw: &str) -> Result<[f64; 5]> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    anyhow::ensure!(
        parts.len() == 5,
        "DEFAULT_WEIGHTS must have 5 comma-separated values, got {}",
        parts.len()
    );
    let mut weights = [0.0; 5];
    for (slot, part) in weights.iter_mut().zip(parts.iter()) {
        let value: f64 = part
            .parse()
            .with_context(|| format!("invalid weight value: {part}"))?;
        anyhow::ensure!(value >= 0.0, "weights must be non-negative, got {value}");
        *slot = value;
    }
    Ok(weights)
}

fn validate(config: &Config) -> Result<()> {
    anyhow::ensure!(
        config.db.max_connections >= 1,
        "db.max_connections must be >= 1"
    );
    anyhow::ensure!(config.embedding.dims > 0, "embedding.dims must be > 0");
    match config.embedding.provider.as_str() {
        "http" | "deterministic" => {}
        other => {
            anyhow::bail!("Unknown embedding provider: '{other}'. Must be http or deterministic.")
        }
    }
    anyhow::ensure!(
        config.search.max_limit >= 1 && config.search.max_limit <= 50,
        "search.max_limit must be in 1..=50"
    );
    anyhow::ensure!(
        config.search.default_limit >= 1 && config.search.default_limit <= config.search.max_limit,
        "search.default_limit must be in 1..=max_limit"
    );
    anyhow::ensure!(
        config.search.candidate_limit >= 1,
        "search.candidate_limit must be >= 1"
    );
    anyhow::ensure!(
        config.search.hard_deadline_ms >= config.search.soft_deadline_ms,
        "search.hard_deadline_ms must be >= soft_deadline_ms"
    );
    if let Some(weights) = &config.default_weights {
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            eprintln!(
                "Warning: configured default weights sum to {sum:.3}, not 1.0; \
                 scores remain comparable within a query only"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
        assert_eq!(config.db.max_connections, 5);
        assert_eq!(config.embedding.dims, 384);
        assert_eq!(config.search.candidate_limit, 5000);
        assert_eq!(config.search.max_limit, 50);
    }

    #[test]
    fn zero_connection_pool_is_rejected() {
        let mut config = Config::default();
        config.db.max_connections = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn parse_weights_accepts_five_values() {
        let w = parse_weights("0.5, 0.2, 0.15, 0.1, 0.05").unwrap();
        assert_eq!(w, [0.5, 0.2, 0.15, 0.1, 0.05]);
    }

    #[test]
    fn parse_weights_rejects_wrong_arity_and_negatives() {
        assert!(parse_weights("0.5,0.5").is_err());
        assert!(parse_weights("0.5,0.2,0.15,0.1,-0.05").is_err());
        assert!(parse_weights("a,b,c,d,e").is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            dims = 256

            [search]
            default_limit = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.embedding.dims, 256);
        assert_eq!(config.embedding.model, "all-MiniLM-L6-v2");
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.search.min_score, 0.1);
    }

    #[test]
    fn default_weights_tuple_prefers_configured() {
        let mut config = Config::default();
        let w = config.default_weights(0);
        assert_eq!(w.alpha, 0.5);

        config.default_weights = Some([0.6, 0.2, 0.1, 0.05, 0.05]);
        let w = config.default_weights(0);
        assert_eq!(w.alpha, 0.6);
        assert_eq!(w.label, "configured");
    }
}
