//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation to SQL against the schema created by
//! [`crate::migrate`]. Every public write runs as a single transaction.
//! Vectors are persisted in the committed wire format: a JSON array of
//! floats in the `vector` column.
//!
//! sqlx errors are translated at this boundary: UNIQUE violations become
//! `Conflict`, everything else `Unavailable` — connectivity loss must not
//! crash the process, so callers can degrade.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use shopsense_core::embedding::{vector_from_json, vector_to_json};
use shopsense_core::error::{Error, Result};
use shopsense_core::models::{
    Availability, EvaluationMetric, Interaction, InteractionKind, JobStatus, MetricKind, Product,
    RankingWeights, ResultExplanation, SearchLog, Session, StoredEmbedding, UploadJob,
    SESSION_TTL_SECS,
};
use shopsense_core::ranker::Candidate;
use shopsense_core::store::{Store, StoreStats};

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> Error {
    if let sqlx::Error::Database(ref db) = e {
        if db.message().contains("UNIQUE constraint failed") {
            return Error::Conflict(db.message().to_string());
        }
    }
    Error::Unavailable(format!("database error: {e}"))
}

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    let availability: String = row.get("availability");
    let features_json: String = row.get("features_json");
    let features: Vec<String> = serde_json::from_str(&features_json).unwrap_or_default();

    Ok(Product {
        id: row.get("id"),
        sku: row.get("sku"),
        title: row.get("title"),
        description: row.get("description"),
        category: row.get("category"),
        subcategory: row.get("subcategory"),
        brand: row.get("brand"),
        features,
        price: row.get("price"),
        original_price: row.get("original_price"),
        currency: row.get("currency"),
        rating: row.get("rating"),
        review_count: row.get("review_count"),
        availability: Availability::parse(&availability)?,
        stock_quantity: row.get("stock_quantity"),
        image_url: row.get("image_url"),
        featured: row.get::<i64, _>("featured") != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// Qualified so joins against product_embeddings (which has its own
// created_at/updated_at) stay unambiguous.
const PRODUCT_COLUMNS: &str = "products.id, products.sku, products.title, products.description, \
     products.category, products.subcategory, products.brand, products.features_json, \
     products.price, products.original_price, products.currency, products.rating, \
     products.review_count, products.availability, products.stock_quantity, \
     products.image_url, products.featured, products.created_at, products.updated_at";

fn interaction_from_row(row: &SqliteRow) -> Result<Interaction> {
    let kind: String = row.get("kind");
    Ok(Interaction {
        id: row.get("id"),
        session_id: row.get("session_id"),
        product_id: row.get("product_id"),
        kind: InteractionKind::parse(&kind)?,
        query: row.get("query"),
        position: row.get("position"),
        created_at: row.get("created_at"),
    })
}

fn weights_from_row(row: &SqliteRow) -> RankingWeights {
    RankingWeights {
        id: row.get("id"),
        label: row.get("label"),
        alpha: row.get("alpha"),
        beta: row.get("beta"),
        gamma: row.get("gamma"),
        delta: row.get("delta"),
        epsilon: row.get("epsilon"),
        active: row.get::<i64, _>("active") != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn log_from_row(row: &SqliteRow) -> Result<SearchLog> {
    let vector_json: String = row.get("query_vector");
    Ok(SearchLog {
        id: row.get("id"),
        session_id: row.get("session_id"),
        query: row.get("query"),
        query_vector: vector_from_json(&vector_json)?,
        result_count: row.get("result_count"),
        response_time_ms: row.get("response_time_ms"),
        filters_json: row.get("filters_json"),
        created_at: row.get("created_at"),
    })
}

fn explanation_from_row(row: &SqliteRow) -> ResultExplanation {
    let matched_json: String = row.get("matched_terms");
    ResultExplanation {
        id: row.get("id"),
        search_log_id: row.get("search_log_id"),
        product_id: row.get("product_id"),
        position: row.get("position"),
        final_score: row.get("final_score"),
        semantic_score: row.get("semantic_score"),
        rating_score: row.get("rating_score"),
        price_score: row.get("price_score"),
        stock_score: row.get("stock_score"),
        recency_score: row.get("recency_score"),
        matched_terms: serde_json::from_str(&matched_json).unwrap_or_default(),
        explanation: row.get("explanation"),
        was_clicked: row.get::<i64, _>("was_clicked") != 0,
    }
}

fn job_from_row(row: &SqliteRow) -> Result<UploadJob> {
    let status: String = row.get("status");
    Ok(UploadJob {
        id: row.get("id"),
        filename: row.get("filename"),
        status: JobStatus::parse(&status)?,
        total_products: row.get("total_products"),
        processed_products: row.get("processed_products"),
        embedded_products: row.get("embedded_products"),
        error: row.get("error"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_product(&self, product: &Product) -> Result<Product> {
        product.validate()?;
        let features_json =
            serde_json::to_string(&product.features).unwrap_or_else(|_| "[]".to_string());

        sqlx::query(
            r#"
            INSERT INTO products (id, sku, title, description, category, subcategory, brand,
                                  features_json, price, original_price, currency, rating,
                                  review_count, availability, stock_quantity, image_url,
                                  featured, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                sku = excluded.sku,
                title = excluded.title,
                description = excluded.description,
                category = excluded.category,
                subcategory = excluded.subcategory,
                brand = excluded.brand,
                features_json = excluded.features_json,
                price = excluded.price,
                original_price = excluded.original_price,
                currency = excluded.currency,
                rating = excluded.rating,
                review_count = excluded.review_count,
                availability = excluded.availability,
                stock_quantity = excluded.stock_quantity,
                image_url = excluded.image_url,
                featured = excluded.featured,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(product.id)
        .bind(&product.sku)
        .bind(&product.title)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.subcategory)
        .bind(&product.brand)
        .bind(&features_json)
        .bind(product.price)
        .bind(product.original_price)
        .bind(&product.currency)
        .bind(product.rating)
        .bind(product.review_count)
        .bind(product.availability.as_str())
        .bind(product.stock_quantity)
        .bind(&product.image_url)
        .bind(product.featured as i64)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(product.clone())
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn delete_product(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM product_embeddings WHERE product_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn candidate_products(&self, limit: usize) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}, e.vector AS embedding_vector
            FROM products
            LEFT JOIN product_embeddings e ON e.product_id = products.id
            ORDER BY products.created_at DESC, products.id DESC
            LIMIT ?
            "#
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let product = product_from_row(row)?;
            let vector = match row.get::<Option<String>, _>("embedding_vector") {
                Some(json) => match vector_from_json(&json) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        eprintln!(
                            "Warning: malformed stored vector for product {}; treating as missing",
                            product.id
                        );
                        None
                    }
                },
                None => None,
            };
            candidates.push(Candidate { product, vector });
        }
        Ok(candidates)
    }

    async fn featured_products(&self, limit: usize) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE featured = 1
            ORDER BY rating DESC, id ASC
            LIMIT ?
            "#
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(product_from_row).collect()
    }

    async fn products_in_category(
        &self,
        category: &str,
        exclude_id: i64,
        limit: usize,
    ) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE id != ? AND lower(category) = lower(?)
            ORDER BY rating DESC, id ASC
            LIMIT ?
            "#
        ))
        .bind(exclude_id)
        .bind(category)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(product_from_row).collect()
    }

    async fn products_with_embedding_state(&self) -> Result<Vec<(Product, Option<String>)>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}, e.source_hash AS embedding_hash
            FROM products
            LEFT JOIN product_embeddings e ON e.product_id = products.id
            ORDER BY products.id ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let product = product_from_row(row)?;
            let hash: Option<String> = row.get("embedding_hash");
            out.push((product, hash));
        }
        Ok(out)
    }

    async fn upsert_embedding(&self, embedding: &StoredEmbedding) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO product_embeddings (product_id, vector, source_text, source_hash,
                                            model, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_id) DO UPDATE SET
                vector = excluded.vector,
                source_text = excluded.source_text,
                source_hash = excluded.source_hash,
                model = excluded.model,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(embedding.product_id)
        .bind(vector_to_json(&embedding.vector))
        .bind(&embedding.source_text)
        .bind(&embedding.source_hash)
        .bind(&embedding.model)
        .bind(embedding.created_at)
        .bind(embedding.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_embedding(&self, product_id: i64) -> Result<Option<StoredEmbedding>> {
        let row = sqlx::query(
            "SELECT product_id, vector, source_text, source_hash, model, created_at, updated_at \
             FROM product_embeddings WHERE product_id = ?",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let vector_json: String = row.get("vector");
        Ok(Some(StoredEmbedding {
            product_id: row.get("product_id"),
            vector: vector_from_json(&vector_json)?,
            source_text: row.get("source_text"),
            source_hash: row.get("source_hash"),
            model: row.get("model"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn delete_embedding(&self, product_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM product_embeddings WHERE product_id = ?")
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_embeddings(&self) -> Result<i64> {
        let result = sqlx::query("DELETE FROM product_embeddings")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() as i64)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, created_at, last_active_at, expires_at FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| Session {
            id: r.get("id"),
            created_at: r.get("created_at"),
            last_active_at: r.get("last_active_at"),
            expires_at: r.get("expires_at"),
        }))
    }

    async fn touch_session(&self, id: &str, now: i64) -> Result<Session> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, created_at, last_active_at, expires_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET last_active_at = excluded.last_active_at
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(now)
        .bind(now + SESSION_TTL_SECS)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.get_session(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("session {id} vanished after upsert")))
    }

    async fn append_interaction(&self, interaction: &Interaction) -> Result<Interaction> {
        let result = sqlx::query(
            r#"
            INSERT INTO interactions (session_id, product_id, kind, query, position, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&interaction.session_id)
        .bind(interaction.product_id)
        .bind(interaction.kind.as_str())
        .bind(&interaction.query)
        .bind(interaction.position)
        .bind(interaction.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let mut stored = interaction.clone();
        stored.id = result.last_insert_rowid();
        Ok(stored)
    }

    async fn recent_interactions(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<Interaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, product_id, kind, query, position, created_at
            FROM interactions
            WHERE session_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(interaction_from_row).collect()
    }

    async fn recently_viewed(&self, session_id: &str, limit: usize) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id FROM interactions
            WHERE session_id = ? AND kind = 'view'
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut seen = Vec::new();
        for row in &rows {
            let product_id: i64 = row.get("product_id");
            if !seen.contains(&product_id) {
                seen.push(product_id);
                if seen.len() >= limit {
                    break;
                }
            }
        }
        Ok(seen)
    }

    async fn active_weights(&self) -> Result<Option<RankingWeights>> {
        let row = sqlx::query(
            "SELECT id, label, alpha, beta, gamma, delta, epsilon, active, created_at, updated_at \
             FROM ranking_weights WHERE active = 1 ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.as_ref().map(weights_from_row))
    }

    async fn ensure_active_weights(&self, defaults: &RankingWeights) -> Result<RankingWeights> {
        // Upsert-and-return: at most one insertion, inside one transaction,
        // so two racing searches cannot both materialize defaults.
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing = sqlx::query(
            "SELECT id, label, alpha, beta, gamma, delta, epsilon, active, created_at, updated_at \
             FROM ranking_weights WHERE active = 1 ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(row) = existing {
            tx.commit().await.map_err(db_err)?;
            return Ok(weights_from_row(&row));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO ranking_weights (label, alpha, beta, gamma, delta, epsilon, active,
                                         created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&defaults.label)
        .bind(defaults.alpha)
        .bind(defaults.beta)
        .bind(defaults.gamma)
        .bind(defaults.delta)
        .bind(defaults.epsilon)
        .bind(defaults.created_at)
        .bind(defaults.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        let mut stored = defaults.clone();
        stored.id = result.last_insert_rowid();
        stored.active = true;
        Ok(stored)
    }

    async fn activate_weights(&self, weights: &RankingWeights) -> Result<RankingWeights> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("UPDATE ranking_weights SET active = 0 WHERE active = 1")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let result = sqlx::query(
            r#"
            INSERT INTO ranking_weights (label, alpha, beta, gamma, delta, epsilon, active,
                                         created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&weights.label)
        .bind(weights.alpha)
        .bind(weights.beta)
        .bind(weights.gamma)
        .bind(weights.delta)
        .bind(weights.epsilon)
        .bind(weights.created_at)
        .bind(weights.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        let mut stored = weights.clone();
        stored.id = result.last_insert_rowid();
        stored.active = true;
        Ok(stored)
    }

    async fn record_search(
        &self,
        log: &SearchLog,
        explanations: &[ResultExplanation],
    ) -> Result<SearchLog> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let result = sqlx::query(
            r#"
            INSERT INTO search_logs (session_id, query, query_vector, result_count,
                                     response_time_ms, filters_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.session_id)
        .bind(&log.query)
        .bind(vector_to_json(&log.query_vector))
        .bind(log.result_count)
        .bind(log.response_time_ms)
        .bind(&log.filters_json)
        .bind(log.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let log_id = result.last_insert_rowid();

        for explanation in explanations {
            let matched_json = serde_json::to_string(&explanation.matched_terms)
                .unwrap_or_else(|_| "[]".to_string());
            sqlx::query(
                r#"
                INSERT INTO search_result_explanations
                    (search_log_id, product_id, position, final_score, semantic_score,
                     rating_score, price_score, stock_score, recency_score, matched_terms,
                     explanation, was_clicked)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
                "#,
            )
            .bind(log_id)
            .bind(explanation.product_id)
            .bind(explanation.position)
            .bind(explanation.final_score)
            .bind(explanation.semantic_score)
            .bind(explanation.rating_score)
            .bind(explanation.price_score)
            .bind(explanation.stock_score)
            .bind(explanation.recency_score)
            .bind(&matched_json)
            .bind(&explanation.explanation)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;

        let mut stored = log.clone();
        stored.id = log_id;
        Ok(stored)
    }

    async fn get_search_log(&self, id: i64) -> Result<Option<SearchLog>> {
        let row = sqlx::query(
            "SELECT id, session_id, query, query_vector, result_count, response_time_ms, \
             filters_json, created_at FROM search_logs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(log_from_row).transpose()
    }

    async fn list_search_logs(&self, limit: usize) -> Result<Vec<SearchLog>> {
        let rows = sqlx::query(
            "SELECT id, session_id, query, query_vector, result_count, response_time_ms, \
             filters_json, created_at FROM search_logs ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(log_from_row).collect()
    }

    async fn explanations_for(&self, search_log_id: i64) -> Result<Vec<ResultExplanation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, search_log_id, product_id, position, final_score, semantic_score,
                   rating_score, price_score, stock_score, recency_score, matched_terms,
                   explanation, was_clicked
            FROM search_result_explanations
            WHERE search_log_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(search_log_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.iter().map(explanation_from_row).collect())
    }

    async fn mark_result_clicked(
        &self,
        session_id: &str,
        query: &str,
        product_id: i64,
    ) -> Result<bool> {
        let log_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM search_logs WHERE session_id = ? AND query = ? \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(session_id)
        .bind(query)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(log_id) = log_id else {
            return Ok(false);
        };

        let result = sqlx::query(
            "UPDATE search_result_explanations SET was_clicked = 1 \
             WHERE search_log_id = ? AND product_id = ?",
        )
        .bind(log_id)
        .bind(product_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_metric(&self, metric: &EvaluationMetric) -> Result<EvaluationMetric> {
        let result = sqlx::query(
            r#"
            INSERT INTO evaluation_metrics (search_log_id, kind, value, query_count, note, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(metric.search_log_id)
        .bind(metric.kind.as_str())
        .bind(metric.value)
        .bind(metric.query_count)
        .bind(&metric.note)
        .bind(metric.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let mut stored = metric.clone();
        stored.id = result.last_insert_rowid();
        Ok(stored)
    }

    async fn list_metrics(&self, limit: usize) -> Result<Vec<EvaluationMetric>> {
        let rows = sqlx::query(
            "SELECT id, search_log_id, kind, value, query_count, note, created_at \
             FROM evaluation_metrics ORDER BY id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row.get("kind");
            metrics.push(EvaluationMetric {
                id: row.get("id"),
                search_log_id: row.get("search_log_id"),
                kind: MetricKind::parse(&kind)?,
                value: row.get("value"),
                query_count: row.get("query_count"),
                note: row.get("note"),
                created_at: row.get("created_at"),
            });
        }
        Ok(metrics)
    }

    async fn create_job(&self, filename: &str, now: i64) -> Result<UploadJob> {
        let result = sqlx::query(
            "INSERT INTO upload_jobs (filename, status, started_at) VALUES (?, 'pending', ?)",
        )
        .bind(filename)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(UploadJob {
            id: result.last_insert_rowid(),
            filename: filename.to_string(),
            status: JobStatus::Pending,
            total_products: 0,
            processed_products: 0,
            embedded_products: 0,
            error: None,
            started_at: now,
            completed_at: None,
        })
    }

    async fn get_job(&self, id: i64) -> Result<Option<UploadJob>> {
        let row = sqlx::query(
            "SELECT id, filename, status, total_products, processed_products, embedded_products, \
             error, started_at, completed_at FROM upload_jobs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn update_job(&self, job: &UploadJob) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM upload_jobs WHERE id = ?")
                .bind(job.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;

        let current = JobStatus::parse(
            &current.ok_or_else(|| Error::NotFound(format!("upload job {}", job.id)))?,
        )?;
        if current != job.status && !current.can_transition(job.status) {
            return Err(Error::Conflict(format!(
                "illegal job transition {} -> {}",
                current.as_str(),
                job.status.as_str()
            )));
        }

        sqlx::query(
            r#"
            UPDATE upload_jobs
            SET status = ?, total_products = ?, processed_products = ?, embedded_products = ?,
                error = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.as_str())
        .bind(job.total_products)
        .bind(job.processed_products)
        .bind(job.embedded_products)
        .bind(&job.error)
        .bind(job.completed_at)
        .bind(job.id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let embeddings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_embeddings")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let interactions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        let search_logs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM search_logs")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(StoreStats {
            products,
            embeddings,
            sessions,
            interactions,
            search_logs,
        })
    }
}
