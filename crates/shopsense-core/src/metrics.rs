//! Standard information-retrieval metrics for grading logged queries.
//!
//! Operates on a ranked result list and a set of graded relevance
//! judgments (0–3). All functions are pure; the offline evaluator feeds
//! them from persisted search logs and judgment synthesis
//! ([`crate::judgments`]).
//!
//! Conventions used here:
//! - `DCG@k = Σ (2^rel_i − 1) / log₂(i + 2)` over 0-based positions,
//! - `nDCG@k = 0` when the ideal DCG is 0 (no graded-relevant items),
//! - a result is "relevant" for the binary metrics when its grade is at
//!   least [`DEFAULT_RELEVANCE_THRESHOLD`],
//! - `Precision@k` divides by `min(k, |results|)` so short result lists
//!   are not penalized for positions that do not exist.

use std::collections::{HashMap, HashSet};

/// Minimum grade treated as relevant by Recall/Precision/MRR/AP.
pub const DEFAULT_RELEVANCE_THRESHOLD: u8 = 1;

/// A graded relevance judgment for a (query, product) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RelevanceJudgment {
    pub product_id: i64,
    /// 0 = not relevant … 3 = exact match.
    pub relevance: u8,
}

impl RelevanceJudgment {
    pub fn new(product_id: i64, relevance: u8) -> Self {
        Self {
            product_id,
            relevance,
        }
    }

    pub fn is_relevant(&self) -> bool {
        self.relevance >= DEFAULT_RELEVANCE_THRESHOLD
    }
}

/// The metric set computed per query by the offline evaluator.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct RetrievalMetrics {
    pub ndcg_at_10: f64,
    pub recall_at_10: f64,
    pub precision_at_10: f64,
    pub mrr: f64,
    pub average_precision: f64,
}

impl RetrievalMetrics {
    /// Compute the standard set at k = 10.
    pub fn compute(results: &[(i64, f64)], judgments: &[RelevanceJudgment]) -> Self {
        Self {
            ndcg_at_10: ndcg_at_k(results, judgments, 10),
            recall_at_10: recall_at_k(results, judgments, 10),
            precision_at_10: precision_at_k(results, judgments, 10),
            mrr: reciprocal_rank(results, judgments),
            average_precision: average_precision(results, judgments),
        }
    }
}

fn gain(relevance: u8) -> f64 {
    (1u32 << relevance) as f64 - 1.0
}

/// Discount for a 0-based position: `log₂(i + 2)`.
fn discount(index: usize) -> f64 {
    (index as f64 + 2.0).log2()
}

fn relevant_set(judgments: &[RelevanceJudgment]) -> HashSet<i64> {
    judgments
        .iter()
        .filter(|j| j.is_relevant())
        .map(|j| j.product_id)
        .collect()
}

/// Discounted cumulative gain of the actual ranking, cut at `k`.
pub fn dcg_at_k(results: &[(i64, f64)], judgments: &[RelevanceJudgment], k: usize) -> f64 {
    let rel_map: HashMap<i64, u8> = judgments
        .iter()
        .map(|j| (j.product_id, j.relevance))
        .collect();

    results
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, (product_id, _))| {
            let rel = rel_map.get(product_id).copied().unwrap_or(0);
            gain(rel) / discount(i)
        })
        .sum()
}

/// Normalized DCG: actual DCG over the DCG of the ideally ordered
/// judgment list. Returns 0 when the ideal DCG is 0.
pub fn ndcg_at_k(results: &[(i64, f64)], judgments: &[RelevanceJudgment], k: usize) -> f64 {
    let dcg = dcg_at_k(results, judgments, k);

    let mut ideal: Vec<u8> = judgments.iter().map(|j| j.relevance).collect();
    ideal.sort_unstable_by(|a, b| b.cmp(a));
    let idcg: f64 = ideal
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, &rel)| gain(rel) / discount(i))
        .sum();

    if idcg == 0.0 {
        0.0
    } else {
        dcg / idcg
    }
}

/// Fraction of all relevant items retrieved in the top `k`.
/// 0 when no relevant items exist.
pub fn recall_at_k(results: &[(i64, f64)], judgments: &[RelevanceJudgment], k: usize) -> f64 {
    let relevant = relevant_set(judgments);
    if relevant.is_empty() {
        return 0.0;
    }
    let hits = results
        .iter()
        .take(k)
        .filter(|(id, _)| relevant.contains(id))
        .count();
    hits as f64 / relevant.len() as f64
}

/// Fraction of the top `min(k, |results|)` positions that are relevant.
pub fn precision_at_k(results: &[(i64, f64)], judgments: &[RelevanceJudgment], k: usize) -> f64 {
    let denom = k.min(results.len());
    if denom == 0 {
        return 0.0;
    }
    let relevant = relevant_set(judgments);
    let hits = results
        .iter()
        .take(k)
        .filter(|(id, _)| relevant.contains(id))
        .count();
    hits as f64 / denom as f64
}

/// Reciprocal of the 1-based rank of the first relevant result; 0 when
/// none is retrieved.
pub fn reciprocal_rank(results: &[(i64, f64)], judgments: &[RelevanceJudgment]) -> f64 {
    let relevant = relevant_set(judgments);
    for (i, (id, _)) in results.iter().enumerate() {
        if relevant.contains(id) {
            return 1.0 / (i + 1) as f64;
        }
    }
    0.0
}

/// Mean of the precision values at each relevant result's position.
/// 0 when no relevant items exist.
pub fn average_precision(results: &[(i64, f64)], judgments: &[RelevanceJudgment]) -> f64 {
    let relevant = relevant_set(judgments);
    if relevant.is_empty() {
        return 0.0;
    }

    let mut hits = 0usize;
    let mut precision_sum = 0.0;
    for (i, (id, _)) in results.iter().enumerate() {
        if relevant.contains(id) {
            hits += 1;
            precision_sum += hits as f64 / (i + 1) as f64;
        }
    }

    precision_sum / relevant.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(ids: &[i64]) -> Vec<(i64, f64)> {
        ids.iter()
            .enumerate()
            .map(|(i, &id)| (id, 1.0 - i as f64 * 0.05))
            .collect()
    }

    fn graded(grades: &[u8]) -> Vec<RelevanceJudgment> {
        grades
            .iter()
            .enumerate()
            .map(|(i, &g)| RelevanceJudgment::new(i as i64 + 1, g))
            .collect()
    }

    // A perfect ranking: results in exactly the ideal order.
    #[test]
    fn ndcg_of_perfect_ranking_is_one() {
        let res = results(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let judgments = graded(&[3, 3, 3, 3, 2, 2, 1, 1, 0, 0]);

        assert!((ndcg_at_k(&res, &judgments, 10) - 1.0).abs() < 1e-9);
        assert!((recall_at_k(&res, &judgments, 10) - 1.0).abs() < 1e-12);
        assert!((precision_at_k(&res, &judgments, 10) - 0.8).abs() < 1e-12);
        assert!((reciprocal_rank(&res, &judgments) - 1.0).abs() < 1e-12);
        assert!((average_precision(&res, &judgments) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn ndcg_penalizes_buried_relevance() {
        let judgments = vec![RelevanceJudgment::new(1, 3)];
        let first = ndcg_at_k(&results(&[1, 2, 3]), &judgments, 10);
        let last = ndcg_at_k(&results(&[2, 3, 1]), &judgments, 10);
        assert!((first - 1.0).abs() < 1e-9);
        assert!(last < first);
        // Position 3 (0-based index 2): discount log2(4) = 2.
        assert!((last - 0.5).abs() < 1e-9);
    }

    #[test]
    fn zero_relevant_items_zero_everything() {
        let res = results(&[1, 2, 3]);
        let judgments = graded(&[0, 0, 0]);

        assert_eq!(ndcg_at_k(&res, &judgments, 10), 0.0);
        assert_eq!(recall_at_k(&res, &judgments, 10), 0.0);
        assert_eq!(precision_at_k(&res, &judgments, 10), 0.0);
        assert_eq!(reciprocal_rank(&res, &judgments), 0.0);
        assert_eq!(average_precision(&res, &judgments), 0.0);
    }

    #[test]
    fn precision_uses_actual_result_length_when_short() {
        // 3 results, 2 relevant, k = 10: precision = 2/3, not 2/10.
        let res = results(&[1, 2, 3]);
        let judgments = vec![
            RelevanceJudgment::new(1, 2),
            RelevanceJudgment::new(3, 1),
        ];
        assert!((precision_at_k(&res, &judgments, 10) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn recall_counts_unretrieved_relevant() {
        // Judgments include product 40 which never shows up.
        let res = results(&[1, 2, 3]);
        let judgments = vec![
            RelevanceJudgment::new(1, 1),
            RelevanceJudgment::new(40, 2),
        ];
        assert!((recall_at_k(&res, &judgments, 10) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_results_are_all_zero() {
        let judgments = vec![RelevanceJudgment::new(1, 2)];
        let res: Vec<(i64, f64)> = Vec::new();
        assert_eq!(precision_at_k(&res, &judgments, 10), 0.0);
        assert_eq!(recall_at_k(&res, &judgments, 10), 0.0);
        assert_eq!(reciprocal_rank(&res, &judgments), 0.0);
        assert_eq!(ndcg_at_k(&res, &judgments, 10), 0.0);
    }

    #[test]
    fn mrr_reflects_first_hit_position() {
        let judgments = vec![RelevanceJudgment::new(3, 1)];
        assert!((reciprocal_rank(&results(&[3, 1, 2]), &judgments) - 1.0).abs() < 1e-12);
        assert!((reciprocal_rank(&results(&[1, 2, 3]), &judgments) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(reciprocal_rank(&results(&[1, 2, 4]), &judgments), 0.0);
    }

    #[test]
    fn average_precision_interleaved() {
        // Relevant at positions 1 and 3: AP = (1/1 + 2/3) / 2.
        let res = results(&[1, 2, 3, 4]);
        let judgments = vec![
            RelevanceJudgment::new(1, 1),
            RelevanceJudgment::new(3, 1),
        ];
        let ap = average_precision(&res, &judgments);
        assert!((ap - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn compute_bundles_the_standard_set() {
        let res = results(&[1, 2, 3]);
        let judgments = graded(&[2, 0, 1]);
        let m = RetrievalMetrics::compute(&res, &judgments);
        assert!(m.ndcg_at_10 > 0.9);
        assert!((m.recall_at_10 - 1.0).abs() < 1e-12);
        assert!((m.precision_at_10 - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.mrr - 1.0).abs() < 1e-12);
    }
}
