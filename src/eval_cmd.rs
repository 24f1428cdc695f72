//! Offline retrieval evaluation over logged queries.
//!
//! Replays persisted search logs: for each log, the ranked result list is
//! reconstructed from its explanation rows, relevance judgments are
//! synthesized from lexical overlap, and the standard metric set
//! (nDCG@10, Recall@10, Precision@10, MRR, AP) is computed and persisted —
//! per query and as an aggregate. Metric rows carry a note marking the
//! judgments as auto-synthesized; they grade ranking drift over time, not
//! absolute quality.

use anyhow::Result;
use serde::Serialize;

use shopsense_core::error::Result as CoreResult;
use shopsense_core::judgments::synthesize;
use shopsense_core::metrics::RetrievalMetrics;
use shopsense_core::models::{EvaluationMetric, MetricKind};
use shopsense_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

const AUTO_JUDGMENT_NOTE: &str = "auto-synthesized lexical judgments (weak signal)";

/// Aggregate metrics over the evaluated logs.
#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
    pub query_count: usize,
    pub mean_ndcg_at_10: f64,
    pub mean_recall_at_10: f64,
    pub mean_precision_at_10: f64,
    pub mean_mrr: f64,
    pub mean_average_precision: f64,
}

/// Evaluate up to `limit` most-recent logged queries, persisting per-query
/// and aggregate metric rows. Returns `None` when no log has results.
pub async fn evaluate_logged_queries<S: Store + ?Sized>(
    store: &S,
    limit: usize,
) -> CoreResult<Option<EvalSummary>> {
    let logs = store.list_search_logs(limit).await?;
    let now = chrono::Utc::now().timestamp();

    let mut evaluated = 0usize;
    let mut sums = [0.0f64; 5];

    for log in &logs {
        let explanations = store.explanations_for(log.id).await?;
        if explanations.is_empty() {
            continue;
        }

        let results: Vec<(i64, f64)> = explanations
            .iter()
            .map(|e| (e.product_id, e.final_score))
            .collect();

        // Judge the retrieved set; products deleted since the log was
        // written simply drop out.
        let mut products = Vec::with_capacity(results.len());
        for (product_id, _) in &results {
            if let Some(product) = store.get_product(*product_id).await? {
                products.push(product);
            }
        }
        let judgments = synthesize(&log.query, &products);
        let metrics = RetrievalMetrics::compute(&results, &judgments);

        for (kind, value) in [
            (MetricKind::NdcgAt10, metrics.ndcg_at_10),
            (MetricKind::RecallAt10, metrics.recall_at_10),
            (MetricKind::PrecisionAt10, metrics.precision_at_10),
            (MetricKind::Mrr, metrics.mrr),
        ] {
            store
                .insert_metric(&EvaluationMetric {
                    id: 0,
                    search_log_id: Some(log.id),
                    kind,
                    value,
                    query_count: None,
                    note: Some(AUTO_JUDGMENT_NOTE.to_string()),
                    created_at: now,
                })
                .await?;
        }
        store
            .insert_metric(&EvaluationMetric {
                id: 0,
                search_log_id: Some(log.id),
                kind: MetricKind::Custom,
                value: metrics.average_precision,
                query_count: None,
                note: Some(format!("ap; {AUTO_JUDGMENT_NOTE}")),
                created_at: now,
            })
            .await?;

        evaluated += 1;
        sums[0] += metrics.ndcg_at_10;
        sums[1] += metrics.recall_at_10;
        sums[2] += metrics.precision_at_10;
        sums[3] += metrics.mrr;
        sums[4] += metrics.average_precision;
    }

    if evaluated == 0 {
        return Ok(None);
    }

    let n = evaluated as f64;
    let summary = EvalSummary {
        query_count: evaluated,
        mean_ndcg_at_10: sums[0] / n,
        mean_recall_at_10: sums[1] / n,
        mean_precision_at_10: sums[2] / n,
        mean_mrr: sums[3] / n,
        mean_average_precision: sums[4] / n,
    };

    for (kind, value, note) in [
        (MetricKind::NdcgAt10, summary.mean_ndcg_at_10, "aggregate"),
        (MetricKind::RecallAt10, summary.mean_recall_at_10, "aggregate"),
        (
            MetricKind::PrecisionAt10,
            summary.mean_precision_at_10,
            "aggregate",
        ),
        (MetricKind::Mrr, summary.mean_mrr, "aggregate"),
        (
            MetricKind::Custom,
            summary.mean_average_precision,
            "aggregate ap",
        ),
    ] {
        store
            .insert_metric(&EvaluationMetric {
                id: 0,
                search_log_id: None,
                kind,
                value,
                query_count: Some(evaluated as i64),
                note: Some(format!("{note}; {AUTO_JUDGMENT_NOTE}")),
                created_at: now,
            })
            .await?;
    }

    Ok(Some(summary))
}

/// CLI: evaluate logged queries and print the summary.
pub async fn run_evaluate(config: &Config, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    match evaluate_logged_queries(&store, limit).await? {
        Some(summary) => {
            println!("--- Retrieval Evaluation Summary ---");
            println!("queries evaluated: {}", summary.query_count);
            println!("mean nDCG@10:      {:.4}", summary.mean_ndcg_at_10);
            println!("mean Recall@10:    {:.4}", summary.mean_recall_at_10);
            println!("mean Precision@10: {:.4}", summary.mean_precision_at_10);
            println!("mean MRR:          {:.4}", summary.mean_mrr);
            println!("mean AP:           {:.4}", summary.mean_average_precision);
            println!();
            println!("note: {AUTO_JUDGMENT_NOTE}");
        }
        None => println!("No logged queries with results to evaluate."),
    }

    store.pool().close().await;
    Ok(())
}

/// CLI: list stored evaluation metrics.
pub async fn run_metrics_list(config: &Config, limit: usize) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let metrics = store.list_metrics(limit).await?;
    if metrics.is_empty() {
        println!("No metrics recorded.");
    }
    for metric in &metrics {
        let scope = match metric.search_log_id {
            Some(log_id) => format!("log {log_id}"),
            None => format!(
                "aggregate over {} queries",
                metric.query_count.unwrap_or(0)
            ),
        };
        println!(
            "{:>4}  {:<13} {:.4}  ({scope})",
            metric.id,
            metric.kind.as_str(),
            metric.value
        );
    }

    store.pool().close().await;
    Ok(())
}
