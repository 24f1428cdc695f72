//! Automatic relevance-judgment synthesis.
//!
//! Grades (query, product) pairs on the 0–3 scale from lexical overlap
//! alone, for use when no human labels exist. This is an acknowledged weak
//! signal: the evaluator labels metrics derived from it as auto-synthesized
//! so they are never mistaken for human ground truth.

use crate::metrics::RelevanceJudgment;
use crate::models::Product;
use crate::ranker::query_terms;

/// Synthesize judgments for a query over a product set.
///
/// Grading, with `m` = matched term count and `exact` = any term appearing
/// in the title:
///
/// | Condition | Grade |
/// |-----------|-------|
/// | m/|terms| ≥ 0.8 and exact title hit | 3 |
/// | m/|terms| ≥ 0.5 or exact title hit | 2 |
/// | m > 0 | 1 |
/// | otherwise | 0 |
///
/// Deterministic: the same inputs always produce the same judgments.
pub fn synthesize(query: &str, products: &[Product]) -> Vec<RelevanceJudgment> {
    let terms = query_terms(query);

    products
        .iter()
        .map(|product| {
            let relevance = grade(&terms, product);
            RelevanceJudgment::new(product.id, relevance)
        })
        .collect()
}

fn grade(terms: &[String], product: &Product) -> u8 {
    if terms.is_empty() {
        return 0;
    }

    let text = product.search_text();
    let title = product.title.to_lowercase();

    let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
    let exact_title = terms.iter().any(|t| title.contains(t.as_str()));
    let ratio = matched as f64 / terms.len() as f64;

    if ratio >= 0.8 && exact_title {
        3
    } else if ratio >= 0.5 || exact_title {
        2
    } else if matched > 0 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Availability;

    fn product(id: i64, title: &str, description: &str) -> Product {
        Product {
            id,
            sku: None,
            title: title.to_string(),
            description: description.to_string(),
            category: "kitchen".to_string(),
            subcategory: None,
            brand: None,
            features: Vec::new(),
            price: 25.0,
            original_price: None,
            currency: "USD".to_string(),
            rating: None,
            review_count: 0,
            availability: Availability::InStock,
            stock_quantity: 5,
            image_url: None,
            featured: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn full_title_match_grades_three() {
        let products = vec![product(1, "Cast Iron Skillet Pan", "")];
        let judgments = synthesize("cast iron skillet", &products);
        assert_eq!(judgments[0].relevance, 3);
    }

    #[test]
    fn half_match_grades_two() {
        // 1 of 2 terms matches, in the description only.
        let products = vec![product(1, "Frying Pan", "non-stick ceramic coating")];
        let judgments = synthesize("ceramic skillet", &products);
        assert_eq!(judgments[0].relevance, 2);
    }

    #[test]
    fn title_hit_alone_grades_two() {
        // Only 1 of 3 terms matches, but it hits the title.
        let products = vec![product(1, "Espresso Machine", "")];
        let judgments = synthesize("espresso tamper scale", &products);
        assert_eq!(judgments[0].relevance, 2);
    }

    #[test]
    fn weak_overlap_grades_one() {
        // 1 of 3 terms, matching the category text only.
        let products = vec![product(1, "Bread Box", "steel lid")];
        let judgments = synthesize("kitchen compost caddy", &products);
        assert_eq!(judgments[0].relevance, 1);
    }

    #[test]
    fn no_overlap_grades_zero() {
        let products = vec![product(1, "Garden Hose", "50 foot expandable")];
        let judgments = synthesize("wireless earbuds", &products);
        assert_eq!(judgments[0].relevance, 0);
    }

    #[test]
    fn empty_query_grades_all_zero() {
        let products = vec![product(1, "Anything", "at all")];
        let judgments = synthesize("a of", &products);
        assert_eq!(judgments[0].relevance, 0);
    }

    #[test]
    fn synthesis_is_idempotent() {
        let products = vec![
            product(1, "Cast Iron Skillet", "pre-seasoned"),
            product(2, "Ceramic Bowl Set", "set of four"),
            product(3, "Phone Tripod", "adjustable"),
        ];
        let a = synthesize("cast iron skillet", &products);
        let b = synthesize("cast iron skillet", &products);
        assert_eq!(a, b);
    }
}
