//! # shopsense-core
//!
//! Pure engine logic for the shopsense product discovery service: data
//! models, typed errors, vector math with the deterministic fallback
//! embedding, feature normalizers, the explainable linear re-ranker,
//! session/item/trending recommenders, automatic relevance judgments,
//! standard IR metrics, and the storage abstraction with an in-memory
//! implementation.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Everything here is deterministic: given the same store contents, query,
//! and weights, ranking and evaluation reproduce byte-identical scores —
//! which is what makes logged queries auditable.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Catalog, session, audit, and job row types |
//! | [`error`] | Typed error kinds with stable tags |
//! | [`embedding`] | Cosine/normalization utilities, JSON vector format, deterministic fallback |
//! | [`normalize`] | Rating/price/stock/recency sub-scores |
//! | [`ranker`] | Weighted scoring, matched terms, explanation synthesis |
//! | [`recommend`] | Session, similar, and trending recommendations |
//! | [`judgments`] | Automatic relevance-judgment synthesis |
//! | [`metrics`] | nDCG/Recall/Precision/MRR/AP |
//! | [`store`] | Storage trait and the in-memory backend |

pub mod embedding;
pub mod error;
pub mod judgments;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod ranker;
pub mod recommend;
pub mod store;
