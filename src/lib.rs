//! # shopsense
//!
//! **Explainable product discovery: semantic search, session-based
//! recommendations, and offline retrieval evaluation.**
//!
//! A user issues a natural-language query; shopsense returns a ranked,
//! filtered product list where every result carries an auditable score
//! decomposition and matched-term justification:
//!
//! ```text
//! score = α·max(0, cos(vq,vp) + 0.5·|matched|/|queryTerms|)
//!       + β·rating/5 + γ·priceNorm + δ·stockNorm + ε·recencyNorm
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Embedding    │   │   Ranker /   │   │  SQLite   │
//! │  sidecar or  │──▶│  Recommender │◀──│  (sqlx)   │
//! │ deterministic │   │ (pure core)  │   │           │
//! └──────────────┘   └──────┬───────┘   └─────┬─────┘
//!                           │                 │
//!                     ┌─────┴─────┐     ┌─────┴─────┐
//!                     │    CLI    │     │   HTTP    │
//!                     │(shopsense)│     │  (axum)   │
//!                     └───────────┘     └───────────┘
//! ```
//!
//! The algorithms (ranking, recommendations, judgments, IR metrics) live
//! in the dependency-light `shopsense-core` crate and run against its
//! `Store` trait; this crate supplies the SQLite store, the embedding
//! providers, the search orchestrator, and the CLI/HTTP surfaces.
//!
//! ## Quick Start
//!
//! ```bash
//! shopsense init                                   # create the database
//! shopsense products upsert ./product.json         # add catalog rows
//! shopsense embed pending                          # generate embeddings
//! shopsense search "wireless bluetooth headphones"
//! shopsense trending
//! shopsense serve                                  # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, env overrides, validation |
//! | [`db`] | SQLite connection pool (WAL) |
//! | [`migrate`] | Idempotent schema migrations + legacy column backfill |
//! | [`sqlite_store`] | `Store` implementation over sqlx |
//! | [`embedding`] | Provider trait, HTTP sidecar client, deterministic fallback |
//! | [`search`] | Search orchestrator: embed → rank → log → explain |
//! | [`recommend`] | CLI glue for session/similar/trending recommendations |
//! | [`interactions`] | Session tracker: event ingest and history |
//! | [`weights`] | Active-weights TTL cache and admin updates |
//! | [`products`] | Admin product ops and embedding regeneration |
//! | [`embed_cmd`] | Batch embedding: pending/rebuild/upload jobs |
//! | [`eval_cmd`] | Offline IR evaluation over logged queries |
//! | [`logs`] | Search-log inspection |
//! | [`stats`] | Store row counts |
//! | [`server`] | JSON HTTP server (Axum) with CORS |

pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod eval_cmd;
pub mod interactions;
pub mod logs;
pub mod migrate;
pub mod products;
pub mod recommend;
pub mod search;
pub mod server;
pub mod sqlite_store;
pub mod stats;
pub mod weights;
