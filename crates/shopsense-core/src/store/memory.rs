//! In-memory [`Store`] implementation for tests and ephemeral use.
//!
//! `HashMap`s and `Vec`s behind `std::sync::RwLock`; vector retrieval is a
//! brute-force scan, which matches the contract at test scale. Row ids are
//! assigned from per-collection counters so ordering assertions behave like
//! the SQLite backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{
    EvaluationMetric, Interaction, JobStatus, Product, RankingWeights, ResultExplanation,
    SearchLog, Session, StoredEmbedding, UploadJob, SESSION_TTL_SECS,
};
use crate::ranker::Candidate;

use super::{Store, StoreStats};

/// In-memory store for tests and ephemeral environments.
#[derive(Default)]
pub struct InMemoryStore {
    products: RwLock<HashMap<i64, Product>>,
    embeddings: RwLock<HashMap<i64, StoredEmbedding>>,
    sessions: RwLock<HashMap<String, Session>>,
    interactions: RwLock<Vec<Interaction>>,
    weights: RwLock<Vec<RankingWeights>>,
    search_logs: RwLock<Vec<SearchLog>>,
    explanations: RwLock<Vec<ResultExplanation>>,
    metrics: RwLock<Vec<EvaluationMetric>>,
    jobs: RwLock<Vec<UploadJob>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_product(&self, product: &Product) -> Result<Product> {
        let mut products = self.products.write().unwrap();
        if let Some(ref sku) = product.sku {
            let duplicate = products
                .values()
                .any(|p| p.id != product.id && p.sku.as_deref() == Some(sku.as_str()));
            if duplicate {
                return Err(Error::Conflict(format!("duplicate sku: {sku}")));
            }
        }
        products.insert(product.id, product.clone());
        Ok(product.clone())
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        Ok(self.products.read().unwrap().get(&id).cloned())
    }

    async fn delete_product(&self, id: i64) -> Result<bool> {
        let removed = self.products.write().unwrap().remove(&id).is_some();
        if removed {
            self.embeddings.write().unwrap().remove(&id);
        }
        Ok(removed)
    }

    async fn candidate_products(&self, limit: usize) -> Result<Vec<Candidate>> {
        let products = self.products.read().unwrap();
        let embeddings = self.embeddings.read().unwrap();

        let mut rows: Vec<&Product> = products.values().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);

        Ok(rows
            .into_iter()
            .map(|p| Candidate {
                product: p.clone(),
                vector: embeddings.get(&p.id).map(|e| e.vector.clone()),
            })
            .collect())
    }

    async fn featured_products(&self, limit: usize) -> Result<Vec<Product>> {
        let products = self.products.read().unwrap();
        let mut rows: Vec<&Product> = products.values().filter(|p| p.featured).collect();
        rows.sort_by(|a, b| {
            b.rating
                .unwrap_or(0.0)
                .partial_cmp(&a.rating.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        rows.truncate(limit);
        Ok(rows.into_iter().cloned().collect())
    }

    async fn products_in_category(
        &self,
        category: &str,
        exclude_id: i64,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let products = self.products.read().unwrap();
        let mut rows: Vec<&Product> = products
            .values()
            .filter(|p| p.id != exclude_id && p.category.eq_ignore_ascii_case(category))
            .collect();
        rows.sort_by(|a, b| {
            b.rating
                .unwrap_or(0.0)
                .partial_cmp(&a.rating.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        rows.truncate(limit);
        Ok(rows.into_iter().cloned().collect())
    }

    async fn products_with_embedding_state(&self) -> Result<Vec<(Product, Option<String>)>> {
        let products = self.products.read().unwrap();
        let embeddings = self.embeddings.read().unwrap();
        let mut rows: Vec<&Product> = products.values().collect();
        rows.sort_by_key(|p| p.id);
        Ok(rows
            .into_iter()
            .map(|p| {
                let hash = embeddings.get(&p.id).map(|e| e.source_hash.clone());
                (p.clone(), hash)
            })
            .collect())
    }

    async fn upsert_embedding(&self, embedding: &StoredEmbedding) -> Result<()> {
        self.embeddings
            .write()
            .unwrap()
            .insert(embedding.product_id, embedding.clone());
        Ok(())
    }

    async fn get_embedding(&self, product_id: i64) -> Result<Option<StoredEmbedding>> {
        Ok(self.embeddings.read().unwrap().get(&product_id).cloned())
    }

    async fn delete_embedding(&self, product_id: i64) -> Result<bool> {
        Ok(self.embeddings.write().unwrap().remove(&product_id).is_some())
    }

    async fn clear_embeddings(&self) -> Result<i64> {
        let mut embeddings = self.embeddings.write().unwrap();
        let count = embeddings.len() as i64;
        embeddings.clear();
        Ok(count)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().unwrap().get(id).cloned())
    }

    async fn touch_session(&self, id: &str, now: i64) -> Result<Session> {
        let mut sessions = self.sessions.write().unwrap();
        let session = sessions
            .entry(id.to_string())
            .and_modify(|s| s.last_active_at = now)
            .or_insert_with(|| Session {
                id: id.to_string(),
                created_at: now,
                last_active_at: now,
                expires_at: now + SESSION_TTL_SECS,
            });
        Ok(session.clone())
    }

    async fn append_interaction(&self, interaction: &Interaction) -> Result<Interaction> {
        let mut interactions = self.interactions.write().unwrap();
        let mut row = interaction.clone();
        row.id = interactions.len() as i64 + 1;
        interactions.push(row.clone());
        Ok(row)
    }

    async fn recent_interactions(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let interactions = self.interactions.read().unwrap();
        let mut rows: Vec<Interaction> = interactions
            .iter()
            .filter(|i| i.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn recently_viewed(&self, session_id: &str, limit: usize) -> Result<Vec<i64>> {
        let recent = self.recent_interactions(session_id, usize::MAX).await?;
        let mut seen = Vec::new();
        for interaction in recent {
            if interaction.kind == crate::models::InteractionKind::View
                && !seen.contains(&interaction.product_id)
            {
                seen.push(interaction.product_id);
                if seen.len() >= limit {
                    break;
                }
            }
        }
        Ok(seen)
    }

    async fn active_weights(&self) -> Result<Option<RankingWeights>> {
        Ok(self
            .weights
            .read()
            .unwrap()
            .iter()
            .find(|w| w.active)
            .cloned())
    }

    async fn ensure_active_weights(&self, defaults: &RankingWeights) -> Result<RankingWeights> {
        let mut weights = self.weights.write().unwrap();
        if let Some(active) = weights.iter().find(|w| w.active) {
            return Ok(active.clone());
        }
        let mut row = defaults.clone();
        row.id = weights.len() as i64 + 1;
        row.active = true;
        weights.push(row.clone());
        Ok(row)
    }

    async fn activate_weights(&self, new_weights: &RankingWeights) -> Result<RankingWeights> {
        let mut weights = self.weights.write().unwrap();
        for w in weights.iter_mut() {
            w.active = false;
        }
        let mut row = new_weights.clone();
        row.id = weights.len() as i64 + 1;
        row.active = true;
        weights.push(row.clone());
        Ok(row)
    }

    async fn record_search(
        &self,
        log: &SearchLog,
        explanations: &[ResultExplanation],
    ) -> Result<SearchLog> {
        let mut logs = self.search_logs.write().unwrap();
        let mut stored_explanations = self.explanations.write().unwrap();

        let mut row = log.clone();
        row.id = logs.len() as i64 + 1;
        logs.push(row.clone());

        for explanation in explanations {
            let mut e = explanation.clone();
            e.id = stored_explanations.len() as i64 + 1;
            e.search_log_id = row.id;
            stored_explanations.push(e);
        }
        Ok(row)
    }

    async fn get_search_log(&self, id: i64) -> Result<Option<SearchLog>> {
        Ok(self
            .search_logs
            .read()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned())
    }

    async fn list_search_logs(&self, limit: usize) -> Result<Vec<SearchLog>> {
        let logs = self.search_logs.read().unwrap();
        Ok(logs.iter().rev().take(limit).cloned().collect())
    }

    async fn explanations_for(&self, search_log_id: i64) -> Result<Vec<ResultExplanation>> {
        let explanations = self.explanations.read().unwrap();
        let mut rows: Vec<ResultExplanation> = explanations
            .iter()
            .filter(|e| e.search_log_id == search_log_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.position);
        Ok(rows)
    }

    async fn mark_result_clicked(
        &self,
        session_id: &str,
        query: &str,
        product_id: i64,
    ) -> Result<bool> {
        let log_id = {
            let logs = self.search_logs.read().unwrap();
            logs.iter()
                .rev()
                .find(|l| l.session_id == session_id && l.query == query)
                .map(|l| l.id)
        };
        let Some(log_id) = log_id else {
            return Ok(false);
        };

        let mut explanations = self.explanations.write().unwrap();
        for e in explanations.iter_mut() {
            if e.search_log_id == log_id && e.product_id == product_id {
                e.was_clicked = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn insert_metric(&self, metric: &EvaluationMetric) -> Result<EvaluationMetric> {
        let mut metrics = self.metrics.write().unwrap();
        let mut row = metric.clone();
        row.id = metrics.len() as i64 + 1;
        metrics.push(row.clone());
        Ok(row)
    }

    async fn list_metrics(&self, limit: usize) -> Result<Vec<EvaluationMetric>> {
        let metrics = self.metrics.read().unwrap();
        Ok(metrics.iter().rev().take(limit).cloned().collect())
    }

    async fn create_job(&self, filename: &str, now: i64) -> Result<UploadJob> {
        let mut jobs = self.jobs.write().unwrap();
        let job = UploadJob {
            id: jobs.len() as i64 + 1,
            filename: filename.to_string(),
            status: JobStatus::Pending,
            total_products: 0,
            processed_products: 0,
            embedded_products: 0,
            error: None,
            started_at: now,
            completed_at: None,
        };
        jobs.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: i64) -> Result<Option<UploadJob>> {
        Ok(self.jobs.read().unwrap().iter().find(|j| j.id == id).cloned())
    }

    async fn update_job(&self, job: &UploadJob) -> Result<()> {
        let mut jobs = self.jobs.write().unwrap();
        let existing = jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| Error::NotFound(format!("upload job {}", job.id)))?;
        if existing.status != job.status && !existing.status.can_transition(job.status) {
            return Err(Error::Conflict(format!(
                "illegal job transition {} -> {}",
                existing.status.as_str(),
                job.status.as_str()
            )));
        }
        *existing = job.clone();
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            products: self.products.read().unwrap().len() as i64,
            embeddings: self.embeddings.read().unwrap().len() as i64,
            sessions: self.sessions.read().unwrap().len() as i64,
            interactions: self.interactions.read().unwrap().len() as i64,
            search_logs: self.search_logs.read().unwrap().len() as i64,
        })
    }
}
