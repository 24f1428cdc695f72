//! Explainable linear re-ranker.
//!
//! Combines semantic similarity with rating, price, stock, and recency
//! sub-scores under operator-tunable weights:
//!
//! ```text
//! score = α·max(0, cos(vq,vp) + 0.5·|matched|/|queryTerms|)
//!       + β·rating/5 + γ·priceNorm + δ·stockNorm + ε·recencyNorm
//! ```
//!
//! This formula string is public and surfaced to operators; the
//! implementation here must match it. Final scores are not normalized to
//! `[0, 1]` — they are comparable within a single query only.
//!
//! The ranker is pure and non-suspending: given the same query, weights,
//! and candidate set it yields byte-identical scores, which is what makes
//! logged queries replayable.

use crate::embedding::{cosine_similarity, fallback_vector, is_unit_norm};
use crate::models::{Availability, Product, RankingWeights};
use crate::normalize::{price_score, rating_score, recency_score, stock_score, PriceRange};

/// Default minimum final score a result must reach (θ).
pub const DEFAULT_MIN_SCORE: f64 = 0.1;

/// A product under consideration for a single query, with its stored
/// embedding when one exists.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub product: Product,
    pub vector: Option<Vec<f32>>,
}

/// All inputs for one ranking pass.
#[derive(Debug)]
pub struct RankRequest<'a> {
    pub query: &'a str,
    pub query_vector: &'a [f32],
    pub candidates: Vec<Candidate>,
    pub weights: &'a RankingWeights,
    /// Minimum final score (θ); results below are dropped.
    pub min_score: f64,
    /// Maximum results to return.
    pub limit: usize,
    /// Server time, for the recency sub-score.
    pub now: i64,
}

/// Per-result score decomposition, rounded to six decimal places.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScoreBreakdown {
    pub semantic: f64,
    pub rating: f64,
    pub price: f64,
    pub stock: f64,
    pub recency: f64,
}

/// One ranked result with its audit trail.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RankedProduct {
    pub product: Product,
    pub final_score: f64,
    pub scores: ScoreBreakdown,
    pub matched_terms: Vec<String>,
    pub explanation: String,
    /// 1-based rank in the response.
    pub rank: usize,
}

/// Output of a ranking pass. `skipped_products` lists ids whose stored
/// vector violated the unit-norm invariant; the caller logs them.
#[derive(Debug, Clone, Default)]
pub struct RankOutcome {
    pub results: Vec<RankedProduct>,
    pub skipped_products: Vec<i64>,
}

/// Tokenize a query: split on whitespace, drop tokens of length ≤ 2,
/// lowercase, deduplicate in query order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in query.split_whitespace() {
        if token.chars().count() <= 2 {
            continue;
        }
        let lower = token.to_lowercase();
        if !terms.contains(&lower) {
            terms.push(lower);
        }
    }
    terms
}

/// Query terms that appear as substrings of the product's searchable text.
pub fn matched_terms(terms: &[String], search_text_lower: &str) -> Vec<String> {
    terms
        .iter()
        .filter(|t| search_text_lower.contains(t.as_str()))
        .cloned()
        .collect()
}

/// Additive keyword boost: half the fraction of query terms matched.
pub fn keyword_boost(matched: usize, total_terms: usize) -> f64 {
    if total_terms == 0 {
        return 0.0;
    }
    0.5 * matched as f64 / total_terms as f64
}

/// Round to six decimal places — the precision persisted in explanation
/// rows, applied up front so replays reproduce scores exactly.
pub fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// Rank a candidate set for a query.
///
/// An empty candidate set yields an empty result, not an error. Candidates
/// without a stored vector fall back to the deterministic embedding of
/// their descriptive text; candidates whose stored vector is not
/// unit-normalized are skipped and reported.
pub fn rank(req: RankRequest<'_>) -> RankOutcome {
    let terms = query_terms(req.query);
    let price_range = PriceRange::from_prices(req.candidates.iter().map(|c| Some(c.product.price)));

    let mut skipped = Vec::new();
    let mut scored: Vec<RankedProduct> = Vec::with_capacity(req.candidates.len());

    for candidate in req.candidates {
        let Candidate { product, vector } = candidate;

        let semantic_raw = match &vector {
            Some(v) if !is_unit_norm(v) => {
                skipped.push(product.id);
                continue;
            }
            Some(v) => cosine_similarity(req.query_vector, v),
            None => {
                let fv = fallback_vector(&product.embedding_text(), req.query_vector.len());
                cosine_similarity(req.query_vector, &fv)
            }
        };
        let semantic = f64::from(semantic_raw).max(0.0);

        let matched = matched_terms(&terms, &product.search_text());
        let boost = keyword_boost(matched.len(), terms.len());
        let semantic = (semantic + boost).clamp(0.0, 1.0);

        let scores = ScoreBreakdown {
            semantic: round6(semantic),
            rating: round6(rating_score(product.rating)),
            price: round6(price_score(Some(product.price), price_range)),
            stock: round6(stock_score(product.availability, product.stock_quantity)),
            recency: round6(recency_score(product.created_at, req.now)),
        };

        let final_score = round6(
            req.weights.alpha * scores.semantic
                + req.weights.beta * scores.rating
                + req.weights.gamma * scores.price
                + req.weights.delta * scores.stock
                + req.weights.epsilon * scores.recency,
        );

        if final_score < req.min_score {
            continue;
        }

        let explanation = synthesize_explanation(&product, &scores, &matched);
        scored.push(RankedProduct {
            product,
            final_score,
            scores,
            matched_terms: matched,
            explanation,
            rank: 0,
        });
    }

    scored.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.product.id.cmp(&b.product.id))
    });
    scored.truncate(req.limit);

    for (i, result) in scored.iter_mut().enumerate() {
        result.rank = i + 1;
    }

    RankOutcome {
        results: scored,
        skipped_products: skipped,
    }
}

/// Concatenate the applicable explanation fragments with " • ".
pub fn synthesize_explanation(
    product: &Product,
    scores: &ScoreBreakdown,
    matched: &[String],
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if scores.semantic > 0.5 {
        parts.push(format!(
            "High semantic match ({:.0}%)",
            scores.semantic * 100.0
        ));
    } else if scores.semantic > 0.3 {
        parts.push(format!(
            "Moderate semantic match ({:.0}%)",
            scores.semantic * 100.0
        ));
    }

    if !matched.is_empty() {
        let shown: Vec<&str> = matched.iter().take(3).map(String::as_str).collect();
        parts.push(format!("Matches: {}", shown.join(", ")));
    }

    if let Some(rating) = product.rating {
        if rating >= 4.0 {
            parts.push(format!("Highly rated ({rating:.1}★)"));
        }
    }

    if scores.price > 0.7 {
        parts.push("Great value".to_string());
    }

    if product.availability == Availability::InStock {
        parts.push("In stock".to_string());
    }

    if parts.is_empty() {
        "Relevant to your search".to_string()
    } else {
        parts.join(" • ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::l2_normalize;

    const DAY: i64 = 86_400;

    fn product(id: i64, title: &str, rating: f64, price: f64, created_at: i64) -> Product {
        Product {
            id,
            sku: None,
            title: title.to_string(),
            description: String::new(),
            category: "general".to_string(),
            subcategory: None,
            brand: None,
            features: Vec::new(),
            price,
            original_price: None,
            currency: "USD".to_string(),
            rating: Some(rating),
            review_count: 100,
            availability: Availability::InStock,
            stock_quantity: 500,
            image_url: None,
            featured: false,
            created_at,
            updated_at: created_at,
        }
    }

    /// Unit vector at a given cosine to the reference axis [1, 0].
    fn at_cosine(c: f32) -> Vec<f32> {
        let mut v = vec![c, (1.0 - c * c).sqrt()];
        l2_normalize(&mut v);
        v
    }

    fn weights() -> RankingWeights {
        RankingWeights::with_defaults(0)
    }

    #[test]
    fn query_terms_drop_short_tokens_and_dedupe() {
        let terms = query_terms("TV 4k OLED tv oled OLED screen");
        assert_eq!(terms, vec!["oled", "screen"]);
    }

    #[test]
    fn matched_terms_preserve_query_order() {
        let terms = query_terms("wireless bluetooth headphones");
        let matched = matched_terms(
            &terms,
            "sony wh-1000xm5 wireless bluetooth headphones",
        );
        assert_eq!(matched, vec!["wireless", "bluetooth", "headphones"]);
    }

    #[test]
    fn boost_is_zero_without_query_terms() {
        assert_eq!(keyword_boost(0, 0), 0.0);
        assert_eq!(keyword_boost(2, 4), 0.25);
        assert_eq!(keyword_boost(3, 3), 0.5);
    }

    #[test]
    fn empty_candidate_set_yields_empty_result() {
        let w = weights();
        let outcome = rank(RankRequest {
            query: "anything",
            query_vector: &[1.0, 0.0],
            candidates: Vec::new(),
            weights: &w,
            min_score: DEFAULT_MIN_SCORE,
            limit: 10,
            now: 0,
        });
        assert!(outcome.results.is_empty());
        assert!(outcome.skipped_products.is_empty());
    }

    // The worked "semantic win over rating" scenario: a matching product
    // beats a better-rated but unrelated one.
    #[test]
    fn semantic_match_outranks_higher_rating() {
        let now = 100 * DAY;
        let created = now - 30 * DAY;
        let w = weights();

        let a = product(
            1,
            "Sony WH-1000XM5 Wireless Bluetooth Headphones",
            4.8,
            329.99,
            created,
        );
        let b = product(2, "Luxury Leather Office Chair", 5.0, 329.99, created);

        let outcome = rank(RankRequest {
            query: "wireless bluetooth headphones",
            query_vector: &[1.0, 0.0],
            candidates: vec![
                Candidate {
                    product: a,
                    vector: Some(at_cosine(0.88)),
                },
                Candidate {
                    product: b,
                    vector: Some(at_cosine(0.05)),
                },
            ],
            weights: &w,
            min_score: DEFAULT_MIN_SCORE,
            limit: 10,
            now,
        });

        assert_eq!(outcome.results.len(), 2);
        let first = &outcome.results[0];
        let second = &outcome.results[1];

        assert_eq!(first.product.id, 1);
        assert_eq!(first.rank, 1);
        assert_eq!(
            first.matched_terms,
            vec!["wireless", "bluetooth", "headphones"]
        );
        // 0.5·min(1, 0.88+0.5) + 0.2·0.96 + 0.15·0.5 + 0.1·1 + 0.05·1
        assert!((first.final_score - 0.917).abs() < 1e-6, "A = {}", first.final_score);
        assert_eq!(first.scores.semantic, 1.0);

        assert_eq!(second.product.id, 2);
        assert_eq!(second.rank, 2);
        assert!(second.matched_terms.is_empty());
        // 0.5·0.05 + 0.2·1 + 0.15·0.5 + 0.1·1 + 0.05·1
        assert!((second.final_score - 0.45).abs() < 1e-6, "B = {}", second.final_score);
    }

    #[test]
    fn scores_non_increasing_and_ties_break_by_id() {
        let now = 10 * DAY;
        let w = weights();
        // Identical products except id — identical scores.
        let candidates: Vec<Candidate> = [3, 1, 2]
            .iter()
            .map(|&id| Candidate {
                product: product(id, "Steel Water Bottle", 4.0, 20.0, 0),
                vector: Some(at_cosine(0.5)),
            })
            .collect();

        let outcome = rank(RankRequest {
            query: "steel bottle",
            query_vector: &[1.0, 0.0],
            candidates,
            weights: &w,
            min_score: DEFAULT_MIN_SCORE,
            limit: 10,
            now,
        });

        let ids: Vec<i64> = outcome.results.iter().map(|r| r.product.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        for pair in outcome.results.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
    }

    #[test]
    fn threshold_filters_low_scores() {
        let w = weights();
        let outcome = rank(RankRequest {
            query: "quantum flux capacitor",
            query_vector: &[1.0, 0.0],
            candidates: vec![Candidate {
                product: {
                    let mut p = product(1, "Plain Socks", 0.0, 5.0, -400 * DAY);
                    p.rating = None;
                    p.availability = Availability::OutOfStock;
                    p.stock_quantity = 0;
                    p
                },
                vector: Some(at_cosine(0.0)),
            }],
            weights: &w,
            min_score: 0.5,
            limit: 10,
            now: 0,
        });
        assert!(outcome.results.is_empty());
    }

    #[test]
    fn missing_vector_falls_back_to_deterministic() {
        let w = weights();
        let p = product(1, "Bamboo Cutting Board", 4.5, 25.0, 0);
        let qv = fallback_vector("bamboo cutting board", 64);

        let outcome = rank(RankRequest {
            query: "bamboo cutting board",
            query_vector: &qv,
            candidates: vec![Candidate {
                product: p,
                vector: None,
            }],
            weights: &w,
            min_score: DEFAULT_MIN_SCORE,
            limit: 10,
            now: 0,
        });
        assert_eq!(outcome.results.len(), 1);
        // All three query terms match, so the boost alone puts σ̂ at 0.5+.
        assert!(outcome.results[0].scores.semantic >= 0.5);
    }

    #[test]
    fn non_normalized_vector_is_skipped_not_fatal() {
        let w = weights();
        let outcome = rank(RankRequest {
            query: "desk lamp",
            query_vector: &[1.0, 0.0],
            candidates: vec![
                Candidate {
                    product: product(7, "Broken Row", 4.0, 10.0, 0),
                    vector: Some(vec![3.0, 4.0]),
                },
                Candidate {
                    product: product(8, "Desk Lamp", 4.0, 10.0, 0),
                    vector: Some(at_cosine(0.9)),
                },
            ],
            weights: &w,
            min_score: DEFAULT_MIN_SCORE,
            limit: 10,
            now: 0,
        });
        assert_eq!(outcome.skipped_products, vec![7]);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].product.id, 8);
    }

    #[test]
    fn ranking_is_deterministic() {
        let w = weights();
        let make = || RankRequest {
            query: "wireless speaker",
            query_vector: &[1.0, 0.0],
            candidates: vec![
                Candidate {
                    product: product(1, "Wireless Speaker", 4.2, 59.99, 0),
                    vector: Some(at_cosine(0.7)),
                },
                Candidate {
                    product: product(2, "Bluetooth Speaker Stand", 3.9, 19.99, 0),
                    vector: Some(at_cosine(0.4)),
                },
            ],
            weights: &w,
            min_score: DEFAULT_MIN_SCORE,
            limit: 10,
            now: 0,
        };

        let first = rank(make());
        let second = rank(make());
        let scores_a: Vec<f64> = first.results.iter().map(|r| r.final_score).collect();
        let scores_b: Vec<f64> = second.results.iter().map(|r| r.final_score).collect();
        assert_eq!(scores_a, scores_b);
    }

    #[test]
    fn explanation_fragments() {
        let now = 0;
        let w = weights();
        let outcome = rank(RankRequest {
            query: "wireless headphones",
            query_vector: &[1.0, 0.0],
            candidates: vec![
                Candidate {
                    product: product(1, "Wireless Headphones Pro", 4.6, 10.0, now),
                    vector: Some(at_cosine(0.8)),
                },
                Candidate {
                    product: product(2, "Cable Organizer", 3.0, 500.0, now),
                    vector: Some(at_cosine(0.2)),
                },
            ],
            weights: &w,
            min_score: 0.0,
            limit: 10,
            now,
        });

        let top = &outcome.results[0];
        assert!(top.explanation.contains("High semantic match"));
        assert!(top.explanation.contains("Matches: wireless, headphones"));
        assert!(top.explanation.contains("Highly rated (4.6★)"));
        assert!(top.explanation.contains("Great value"));
        assert!(top.explanation.contains("In stock"));
        assert!(top.explanation.contains(" • "));

        // Weak match still gets a non-empty justification.
        let weak = &outcome.results[1];
        assert!(!weak.explanation.is_empty());
    }

    #[test]
    fn limit_truncates_after_sort() {
        let w = weights();
        let candidates: Vec<Candidate> = (1..=5)
            .map(|id| Candidate {
                product: product(id, "Ceramic Mug", 4.0, 12.0, 0),
                vector: Some(at_cosine(0.9 - id as f32 * 0.1)),
            })
            .collect();
        let outcome = rank(RankRequest {
            query: "ceramic mug",
            query_vector: &[1.0, 0.0],
            candidates,
            weights: &w,
            min_score: 0.0,
            limit: 2,
            now: 0,
        });
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].product.id, 1);
        assert_eq!(outcome.results[1].product.id, 2);
        assert_eq!(outcome.results[1].rank, 2);
    }
}
