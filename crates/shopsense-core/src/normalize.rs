//! Feature sub-score normalizers.
//!
//! All sub-scores land in `[0, 1]` and are reproducible from the persisted
//! product row alone, so an auditor can replay any logged query. The price
//! score is relative to the candidate set of the current query; the others
//! depend only on the product itself.

use crate::models::Availability;

const SECS_PER_DAY: f64 = 86_400.0;

/// `rating / 5` when present, neutral `0.5` when null.
pub fn rating_score(rating: Option<f64>) -> f64 {
    match rating {
        Some(r) => (r / 5.0).clamp(0.0, 1.0),
        None => 0.5,
    }
}

/// Price bounds over the current query's candidate set.
///
/// "Cheap" is relative to the query's shortlist, not the whole catalog.
#[derive(Debug, Clone, Copy)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    /// Compute bounds from candidate prices. Unknown prices contribute 0.
    /// Returns `None` for an empty candidate set.
    pub fn from_prices(prices: impl Iterator<Item = Option<f64>>) -> Option<PriceRange> {
        let mut range: Option<PriceRange> = None;
        for price in prices {
            let p = price.unwrap_or(0.0);
            range = Some(match range {
                None => PriceRange { min: p, max: p },
                Some(r) => PriceRange {
                    min: r.min.min(p),
                    max: r.max.max(p),
                },
            });
        }
        range
    }
}

/// Min-max inverted price score: `1 − (price − min)/(max − min)`.
///
/// Degenerate ranges (single candidate, all prices equal) and unknown
/// prices score a neutral `0.5`.
pub fn price_score(price: Option<f64>, range: Option<PriceRange>) -> f64 {
    let (price, range) = match (price, range) {
        (Some(p), Some(r)) => (p, r),
        _ => return 0.5,
    };
    let span = range.max - range.min;
    if span <= f64::EPSILON {
        return 0.5;
    }
    (1.0 - (price - range.min) / span).clamp(0.0, 1.0)
}

/// Stock score: out of stock 0, low stock 0.5, in stock scales with
/// quantity up to 500 units.
pub fn stock_score(availability: Availability, stock_quantity: i64) -> f64 {
    match availability {
        Availability::OutOfStock => 0.0,
        Availability::LowStock => 0.5,
        Availability::InStock => {
            let qty = stock_quantity.max(0) as f64;
            (0.7 + 0.3 * qty / 500.0).min(1.0)
        }
    }
}

/// Recency score, piecewise linear in days since creation:
/// ≤ 30 days → 1.0; ≥ 365 days → 0.1; linear in between.
pub fn recency_score(created_at: i64, now: i64) -> f64 {
    let days = (now - created_at) as f64 / SECS_PER_DAY;
    if days <= 30.0 {
        1.0
    } else if days >= 365.0 {
        0.1
    } else {
        1.0 - 0.9 * (days - 30.0) / 335.0
    }
}
