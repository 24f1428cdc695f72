//! Session, item-similar, and trending recommendations.
//!
//! All three paths run against the [`Store`] trait and return the same
//! [`Recommendation`] shape. The session path builds a weighted interaction
//! profile and scans candidate vectors for affinity; the other two are
//! vector- and popularity-driven respectively. Trending is
//! session-independent and safe to cache.

use std::collections::HashMap;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{InteractionKind, Product};
use crate::store::Store;

/// How many recent interactions feed the session profile.
pub const SESSION_HISTORY_LIMIT: usize = 20;

/// Candidates below this affinity are dropped from session recommendations.
pub const MIN_AFFINITY: f64 = 0.1;

/// Similar-product cosine cutoff.
pub const MIN_SIMILARITY: f32 = 0.3;

/// Bound on the candidate pool scanned per recommendation request.
pub const CANDIDATE_POOL: usize = 5000;

/// A recommended product with its score and human-readable reason.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Recommendation {
    pub product: Product,
    pub score: f64,
    pub reason: String,
}

/// Session-based recommendations.
///
/// Builds a profile from the last [`SESSION_HISTORY_LIMIT`] interactions:
/// each interacted product weighs `base_weight(kind) · (1 + (n−i)/n)` (i =
/// 0-based position, most-recent-first), keeping its maximum across
/// repeats. A candidate's affinity is the profile-weighted mean cosine to
/// the interacted vectors. Sessions with no usable history — unknown,
/// expired, empty, or without any embedded interacted product — fall back
/// to the featured cold-start list.
pub async fn for_session<S: Store + ?Sized>(
    store: &S,
    session_id: &str,
    limit: usize,
    exclude: &[i64],
    now: i64,
) -> Result<Vec<Recommendation>> {
    let usable = match store.get_session(session_id).await? {
        Some(session) => !session.is_expired(now),
        None => false,
    };
    if !usable {
        return cold_start(store, limit).await;
    }

    let interactions = store
        .recent_interactions(session_id, SESSION_HISTORY_LIMIT)
        .await?;
    if interactions.is_empty() {
        return cold_start(store, limit).await;
    }

    // Per-product weight, keeping the maximum across repeat interactions.
    let n = interactions.len() as f64;
    let mut profile_weights: HashMap<i64, (f64, InteractionKind)> = HashMap::new();
    for (i, interaction) in interactions.iter().enumerate() {
        let recency = 1.0 + (n - i as f64) / n;
        let weight = interaction.kind.base_weight() * recency;
        profile_weights
            .entry(interaction.product_id)
            .and_modify(|entry| {
                if weight > entry.0 {
                    *entry = (weight, interaction.kind);
                }
            })
            .or_insert((weight, interaction.kind));
    }

    // Attach stored vectors; products without one contribute nothing.
    let mut profile: Vec<(i64, f64, InteractionKind, Vec<f32>)> = Vec::new();
    for (&product_id, &(weight, kind)) in &profile_weights {
        if let Some(embedding) = store.get_embedding(product_id).await? {
            profile.push((product_id, weight, kind, embedding.vector));
        }
    }
    if profile.is_empty() {
        return cold_start(store, limit).await;
    }

    let candidates = store.candidate_products(CANDIDATE_POOL).await?;

    struct Scored {
        product: Product,
        affinity: f64,
        best_kind: InteractionKind,
        best_cosine: f64,
    }

    let mut scored: Vec<Scored> = Vec::new();
    for candidate in candidates {
        let product = candidate.product;
        if exclude.contains(&product.id) || profile_weights.contains_key(&product.id) {
            continue;
        }
        let Some(vector) = candidate.vector else {
            continue;
        };

        let mut sum = 0.0f64;
        let mut best_contribution = f64::NEG_INFINITY;
        let mut best_kind = InteractionKind::View;
        let mut best_cosine = 0.0f64;
        for (_, weight, kind, profile_vec) in &profile {
            let cos = f64::from(cosine_similarity(&vector, profile_vec));
            let contribution = weight * cos;
            sum += contribution;
            if contribution > best_contribution {
                best_contribution = contribution;
                best_kind = *kind;
                best_cosine = cos;
            }
        }
        let affinity = sum / profile.len() as f64;
        if affinity > MIN_AFFINITY {
            scored.push(Scored {
                product,
                affinity,
                best_kind,
                best_cosine,
            });
        }
    }

    scored.sort_by(|a, b| {
        b.affinity
            .partial_cmp(&a.affinity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.product.id.cmp(&b.product.id))
    });
    scored.truncate(limit);

    Ok(scored
        .into_iter()
        .map(|s| {
            let reason = session_reason(s.best_kind, s.best_cosine);
            Recommendation {
                product: s.product,
                score: s.affinity,
                reason,
            }
        })
        .collect())
}

fn session_reason(kind: InteractionKind, cosine: f64) -> String {
    match kind {
        InteractionKind::Purchase => "Based on your purchase".to_string(),
        InteractionKind::AddToCart => "Similar to items in your cart".to_string(),
        _ => {
            if cosine > 0.8 {
                "Very similar to items you viewed".to_string()
            } else if cosine > 0.6 {
                "Similar to your interests".to_string()
            } else if cosine > 0.4 {
                "Related to your browsing".to_string()
            } else {
                "You might like this".to_string()
            }
        }
    }
}

/// Featured products by rating, used when a session has no usable history.
async fn cold_start<S: Store + ?Sized>(store: &S, limit: usize) -> Result<Vec<Recommendation>> {
    let featured = store.featured_products(limit).await?;
    Ok(featured
        .into_iter()
        .map(|product| Recommendation {
            product,
            score: 1.0,
            reason: "Popular product".to_string(),
        })
        .collect())
}

/// Products similar to a given one by embedding cosine.
///
/// Without a stored embedding for the target, falls back to other products
/// in the same category.
pub async fn similar<S: Store + ?Sized>(
    store: &S,
    product_id: i64,
    limit: usize,
) -> Result<Vec<Recommendation>> {
    let target = store
        .get_product(product_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("product {product_id}")))?;

    let Some(target_embedding) = store.get_embedding(product_id).await? else {
        let fallback = store
            .products_in_category(&target.category, product_id, limit)
            .await?;
        return Ok(fallback
            .into_iter()
            .enumerate()
            .map(|(i, product)| Recommendation {
                product,
                score: 1.0 - 0.05 * i as f64,
                reason: "More from this category".to_string(),
            })
            .collect());
    };

    let candidates = store.candidate_products(CANDIDATE_POOL).await?;
    let mut scored: Vec<(Product, f32)> = candidates
        .into_iter()
        .filter(|c| c.product.id != product_id)
        .filter_map(|c| {
            let vector = c.vector?;
            let sim = cosine_similarity(&target_embedding.vector, &vector);
            (sim > MIN_SIMILARITY).then_some((c.product, sim))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.id.cmp(&b.0.id))
    });
    scored.truncate(limit);

    Ok(scored
        .into_iter()
        .map(|(product, sim)| Recommendation {
            product,
            score: f64::from(sim),
            reason: format!("{}% similar", (sim * 100.0).round() as i64),
        })
        .collect())
}

/// Trending products: the featured list ordered by rating, with a
/// positional score. Session-independent and cacheable.
pub async fn trending<S: Store + ?Sized>(store: &S, limit: usize) -> Result<Vec<Recommendation>> {
    let featured = store.featured_products(limit).await?;
    Ok(featured
        .into_iter()
        .enumerate()
        .map(|(i, product)| Recommendation {
            product,
            score: 1.0 - 0.05 * i as f64,
            reason: "Trending now".to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::l2_normalize;
    use crate::models::{Availability, Interaction, StoredEmbedding, SESSION_TTL_SECS};
    use crate::store::memory::InMemoryStore;

    fn product(id: i64, title: &str, rating: f64, featured: bool) -> Product {
        Product {
            id,
            sku: None,
            title: title.to_string(),
            description: String::new(),
            category: "general".to_string(),
            subcategory: None,
            brand: None,
            features: Vec::new(),
            price: 20.0,
            original_price: None,
            currency: "USD".to_string(),
            rating: Some(rating),
            review_count: 10,
            availability: Availability::InStock,
            stock_quantity: 50,
            image_url: None,
            featured,
            created_at: id,
            updated_at: id,
        }
    }

    async fn put_embedding(store: &InMemoryStore, product_id: i64, vector: Vec<f32>) {
        store
            .upsert_embedding(&StoredEmbedding {
                product_id,
                vector,
                source_text: String::new(),
                source_hash: String::new(),
                model: "test".into(),
                created_at: 0,
                updated_at: 0,
            })
            .await
            .unwrap();
    }

    async fn interact(
        store: &InMemoryStore,
        session: &str,
        product_id: i64,
        kind: InteractionKind,
        ts: i64,
    ) {
        store.touch_session(session, ts).await.unwrap();
        store
            .append_interaction(&Interaction {
                id: 0,
                session_id: session.into(),
                product_id,
                kind,
                query: None,
                position: None,
                created_at: ts,
            })
            .await
            .unwrap();
    }

    // Cold start: no interactions → top featured by rating, reason
    // "Popular product", score 1.
    #[tokio::test]
    async fn cold_start_returns_featured_by_rating() {
        let store = InMemoryStore::new();
        for (id, rating) in [(1i64, 4.1), (2, 4.9), (3, 4.5), (4, 4.7), (5, 3.0)] {
            store
                .upsert_product(&product(id, "Featured", rating, true))
                .await
                .unwrap();
        }
        store
            .upsert_product(&product(6, "Not Featured", 5.0, false))
            .await
            .unwrap();
        store.touch_session("fresh", 0).await.unwrap();

        let recs = for_session(&store, "fresh", 4, &[], 0).await.unwrap();
        assert_eq!(recs.len(), 4);
        let ids: Vec<i64> = recs.iter().map(|r| r.product.id).collect();
        assert_eq!(ids, vec![2, 4, 3, 1]);
        for rec in &recs {
            assert_eq!(rec.reason, "Popular product");
            assert_eq!(rec.score, 1.0);
        }
    }

    // The worked affinity scenario: a view of p1 (recent) and an
    // add-to-cart of p2, candidate cX near both, cY near neither.
    #[tokio::test]
    async fn session_affinity_weights_and_reason() {
        let store = InMemoryStore::new();
        for id in [1i64, 2, 3, 4] {
            store.upsert_product(&product(id, "P", 4.0, false)).await.unwrap();
        }

        // p1 = e1; p2 at cosine 0.5 to p1; cX with cos(p1)=0.9, cos(p2)=0.6;
        // cY with cos(p1)=0.1, cos(p2)=0.1.
        let p1 = vec![1.0f32, 0.0, 0.0];
        let p2 = {
            let mut v = vec![0.5f32, 0.75f32.sqrt(), 0.0];
            l2_normalize(&mut v);
            v
        };
        let cx = {
            let y = (0.6 - 0.5 * 0.9) / 0.75f32.sqrt();
            let mut v = vec![0.9f32, y, (1.0 - 0.81 - y * y).max(0.0).sqrt()];
            l2_normalize(&mut v);
            v
        };
        let cy = {
            let y = (0.1 - 0.5 * 0.1) / 0.75f32.sqrt();
            let mut v = vec![0.1f32, y, (1.0 - 0.01 - y * y).max(0.0).sqrt()];
            l2_normalize(&mut v);
            v
        };
        put_embedding(&store, 1, p1).await;
        put_embedding(&store, 2, p2).await;
        put_embedding(&store, 3, cx).await;
        put_embedding(&store, 4, cy).await;

        // Cart first, then the view, so the view is most recent.
        interact(&store, "s", 2, InteractionKind::AddToCart, 10).await;
        interact(&store, "s", 1, InteractionKind::View, 20).await;

        let recs = for_session(&store, "s", 10, &[], 20).await.unwrap();
        assert_eq!(recs.len(), 2);

        // a_cX = (2·0.9 + 6·0.6)/2 = 2.7, a_cY = (2·0.1 + 6·0.1)/2 = 0.4.
        assert_eq!(recs[0].product.id, 3);
        assert!((recs[0].score - 2.7).abs() < 1e-3, "cX = {}", recs[0].score);
        assert_eq!(recs[1].product.id, 4);
        assert!((recs[1].score - 0.4).abs() < 1e-3, "cY = {}", recs[1].score);

        // The cart interaction dominates cX's score, so the reason is
        // cart-flavored.
        assert_eq!(recs[0].reason, "Similar to items in your cart");
    }

    #[tokio::test]
    async fn session_excludes_interacted_and_requested_ids() {
        let store = InMemoryStore::new();
        for id in [1i64, 2, 3] {
            store.upsert_product(&product(id, "P", 4.0, false)).await.unwrap();
            put_embedding(&store, id, vec![1.0, 0.0]).await;
        }
        interact(&store, "s", 1, InteractionKind::View, 5).await;

        let recs = for_session(&store, "s", 10, &[2], 5).await.unwrap();
        let ids: Vec<i64> = recs.iter().map(|r| r.product.id).collect();
        assert!(!ids.contains(&1), "interacted product leaked");
        assert!(!ids.contains(&2), "excluded product leaked");
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test]
    async fn expired_session_falls_back_to_cold_start() {
        let store = InMemoryStore::new();
        store
            .upsert_product(&product(1, "Featured", 4.8, true))
            .await
            .unwrap();
        store.upsert_product(&product(2, "P", 4.0, false)).await.unwrap();
        put_embedding(&store, 2, vec![1.0, 0.0]).await;

        interact(&store, "old", 2, InteractionKind::Purchase, 0).await;

        let later = SESSION_TTL_SECS + 1;
        let recs = for_session(&store, "old", 5, &[], later).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].product.id, 1);
        assert_eq!(recs[0].reason, "Popular product");
    }

    #[tokio::test]
    async fn session_without_embedded_history_falls_back() {
        let store = InMemoryStore::new();
        store
            .upsert_product(&product(1, "Featured", 4.8, true))
            .await
            .unwrap();
        store.upsert_product(&product(2, "P", 4.0, false)).await.unwrap();
        // No embedding for product 2.
        interact(&store, "s", 2, InteractionKind::View, 5).await;

        let recs = for_session(&store, "s", 5, &[], 5).await.unwrap();
        assert_eq!(recs[0].reason, "Popular product");
    }

    #[tokio::test]
    async fn similar_filters_by_cosine_threshold() {
        let store = InMemoryStore::new();
        for id in [1i64, 2, 3] {
            store.upsert_product(&product(id, "P", 4.0, false)).await.unwrap();
        }
        put_embedding(&store, 1, vec![1.0, 0.0]).await;
        put_embedding(&store, 2, vec![0.8, 0.6]).await;
        put_embedding(&store, 3, vec![0.0, 1.0]).await;

        let recs = similar(&store, 1, 10).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].product.id, 2);
        assert_eq!(recs[0].reason, "80% similar");
    }

    #[tokio::test]
    async fn similar_without_embedding_uses_category() {
        let store = InMemoryStore::new();
        let mut target = product(1, "Chair", 4.0, false);
        target.category = "furniture".into();
        let mut other = product(2, "Desk", 4.5, false);
        other.category = "furniture".into();
        let mut unrelated = product(3, "Kettle", 4.9, false);
        unrelated.category = "kitchen".into();
        store.upsert_product(&target).await.unwrap();
        store.upsert_product(&other).await.unwrap();
        store.upsert_product(&unrelated).await.unwrap();

        let recs = similar(&store, 1, 10).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].product.id, 2);
    }

    #[tokio::test]
    async fn similar_unknown_product_is_not_found() {
        let store = InMemoryStore::new();
        let err = similar(&store, 404, 5).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn trending_scores_decay_by_position() {
        let store = InMemoryStore::new();
        for (id, rating) in [(1i64, 4.9), (2, 4.5), (3, 4.1)] {
            store
                .upsert_product(&product(id, "Featured", rating, true))
                .await
                .unwrap();
        }
        let recs = trending(&store, 10).await.unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].score, 1.0);
        assert!((recs[1].score - 0.95).abs() < 1e-12);
        assert!((recs[2].score - 0.9).abs() < 1e-12);
        for rec in &recs {
            assert_eq!(rec.reason, "Trending now");
        }
    }
}
