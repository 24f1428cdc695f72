//! # shopsense CLI
//!
//! The `shopsense` binary is the operational interface for the discovery
//! engine: database initialization, catalog administration, embedding
//! management, search, recommendations, offline evaluation, and the HTTP
//! server.
//!
//! ## Usage
//!
//! ```bash
//! shopsense [--config ./config/shopsense.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shopsense init` | Create the SQLite database and run migrations |
//! | `shopsense search "<query>"` | Ranked, explained product search |
//! | `shopsense similar <id>` | Products similar to a given one |
//! | `shopsense trending` | Trending products |
//! | `shopsense recommend <session>` | Session-based recommendations |
//! | `shopsense record <session> <product> <kind>` | Record an interaction |
//! | `shopsense session <session>` | Show a session's history |
//! | `shopsense weights get/set` | Inspect or tune the ranking weights |
//! | `shopsense products upsert/delete/reembed` | Catalog administration |
//! | `shopsense embed pending/rebuild/job` | Embedding management |
//! | `shopsense eval run/metrics` | Offline retrieval evaluation |
//! | `shopsense logs list/show` | Search-log inspection |
//! | `shopsense stats` | Store row counts |
//! | `shopsense serve` | Start the JSON HTTP server |
//!
//! ## Exit codes
//!
//! 0 on success, 1 for configuration errors, 2 for an unrecoverable
//! repository error during migration.

mod config;
mod db;
mod embed_cmd;
mod embedding;
mod eval_cmd;
mod interactions;
mod logs;
mod migrate;
mod products;
mod recommend;
mod search;
mod server;
mod sqlite_store;
mod stats;
mod weights;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// shopsense — explainable product discovery over a catalog.
///
/// All commands accept `--config` pointing to a TOML file; without it the
/// built-in defaults apply. `DATABASE_URL`, `EMBEDDING_SERVICE_URL`, and
/// `DEFAULT_WEIGHTS` override the file.
#[derive(Parser)]
#[command(
    name = "shopsense",
    about = "Explainable semantic product search and session recommendations",
    version,
    long_about = "shopsense ranks catalog products for natural-language queries with a \
    transparent linear formula over semantic similarity, rating, price, stock, and recency, \
    records per-result explanations for audit, serves session-based recommendations, and \
    grades its own logged rankings with standard IR metrics."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite file and all tables (products, embeddings,
    /// sessions, interactions, weights, logs, explanations, metrics,
    /// jobs). Idempotent — safe to run repeatedly.
    Init,

    /// Search the catalog.
    ///
    /// Embeds the query (degrading to the deterministic vector if the
    /// embedding sidecar is down), ranks candidates under the active
    /// weights, and prints each result's score decomposition.
    Search {
        /// The search query (up to 500 characters).
        query: String,

        /// Session id; a fresh one is minted when omitted.
        #[arg(long)]
        session: Option<String>,

        /// Only products whose category contains this value.
        #[arg(long)]
        category: Option<String>,

        /// Minimum price filter.
        #[arg(long)]
        min_price: Option<f64>,

        /// Maximum price filter.
        #[arg(long)]
        max_price: Option<f64>,

        /// Only in-stock products.
        #[arg(long)]
        in_stock: bool,

        /// Maximum results (1..=50).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Products similar to a given product.
    Similar {
        /// Target product id.
        product_id: i64,

        /// Maximum results (1..=20).
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Trending products (featured list by rating).
    Trending {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Session-based recommendations.
    Recommend {
        /// Session id.
        session: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Product ids to exclude (repeatable).
        #[arg(long = "exclude")]
        exclude: Vec<i64>,
    },

    /// Record an interaction event.
    Record {
        /// Session id.
        session: String,

        /// Product id.
        product_id: i64,

        /// view, click, search_click, add_to_cart, or purchase.
        kind: String,

        /// The query that produced the result (for search_click).
        #[arg(long)]
        query: Option<String>,

        /// 1-based result position (for search_click).
        #[arg(long)]
        position: Option<i64>,
    },

    /// Show a session's recent interactions and viewed products.
    Session {
        session: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Inspect or tune the ranking weights.
    Weights {
        #[command(subcommand)]
        action: WeightsAction,
    },

    /// Catalog administration.
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },

    /// Embedding management.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Offline retrieval evaluation.
    Eval {
        #[command(subcommand)]
        action: EvalAction,
    },

    /// Search-log inspection.
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },

    /// Upload-job observability.
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Store row counts.
    Stats,

    /// Start the JSON HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum WeightsAction {
    /// Print the active weights and the public ranking formula.
    Get,
    /// Activate a new weight tuple (α β γ δ ε).
    Set {
        alpha: f64,
        beta: f64,
        gamma: f64,
        delta: f64,
        epsilon: f64,
        #[arg(long)]
        label: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProductsAction {
    /// Create or update a product from JSON (inline or a file path).
    /// Re-embeds when the descriptive text changed.
    Upsert { json: String },
    /// Delete a product and its embedding.
    Delete { product_id: i64 },
    /// Regenerate one product's embedding.
    Reembed { product_id: i64 },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed products with missing or stale embeddings.
    Pending {
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Show counts without embedding anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete and regenerate all embeddings.
    Rebuild {
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Run the embedding stage of a catalog upload job.
    Job { job_id: i64 },
}

#[derive(Subcommand)]
enum EvalAction {
    /// Evaluate logged queries with auto-synthesized judgments.
    Run {
        /// How many recent logs to evaluate.
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },
    /// List stored evaluation metrics.
    Metrics {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum LogsAction {
    /// List recent search logs.
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show one log with its persisted explanations.
    Show { log_id: i64 },
}

#[derive(Subcommand)]
enum JobsAction {
    /// Create an upload-job row (normally done by the catalog loader).
    Create { filename: String },
    /// Show a job's status and counters.
    Show { job_id: i64 },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match config::load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    if let Commands::Init = cli.command {
        // Migration failure is the unrecoverable-repository startup case.
        if let Err(e) = migrate::run_migrations(&cfg).await {
            eprintln!("Migration error: {e:#}");
            std::process::exit(2);
        }
        println!("Database initialized successfully.");
        return;
    }

    let result = run_command(&cfg, cli.command).await;
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run_command(cfg: &config::Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => unreachable!("handled before dispatch"),
        Commands::Search {
            query,
            session,
            category,
            min_price,
            max_price,
            in_stock,
            limit,
        } => {
            search::run_search(
                cfg, &query, session, category, min_price, max_price, in_stock, limit,
            )
            .await
        }
        Commands::Similar { product_id, limit } => {
            recommend::run_similar(cfg, product_id, limit).await
        }
        Commands::Trending { limit } => recommend::run_trending(cfg, limit).await,
        Commands::Recommend {
            session,
            limit,
            exclude,
        } => recommend::run_for_session(cfg, &session, limit, exclude).await,
        Commands::Record {
            session,
            product_id,
            kind,
            query,
            position,
        } => interactions::run_record(cfg, &session, product_id, &kind, query, position).await,
        Commands::Session { session, limit } => {
            interactions::run_history(cfg, &session, limit).await
        }
        Commands::Weights { action } => match action {
            WeightsAction::Get => weights::run_get(cfg).await,
            WeightsAction::Set {
                alpha,
                beta,
                gamma,
                delta,
                epsilon,
                label,
            } => weights::run_update(cfg, [alpha, beta, gamma, delta, epsilon], label).await,
        },
        Commands::Products { action } => match action {
            ProductsAction::Upsert { json } => products::run_upsert(cfg, &json).await,
            ProductsAction::Delete { product_id } => products::run_delete(cfg, product_id).await,
            ProductsAction::Reembed { product_id } => {
                products::run_regenerate(cfg, product_id).await
            }
        },
        Commands::Embed { action } => match action {
            EmbedAction::Pending {
                limit,
                batch_size,
                dry_run,
            } => embed_cmd::run_embed_pending(cfg, limit, batch_size, dry_run).await,
            EmbedAction::Rebuild { batch_size } => {
                embed_cmd::run_embed_rebuild(cfg, batch_size).await
            }
            EmbedAction::Job { job_id } => embed_cmd::run_embed_job(cfg, job_id).await,
        },
        Commands::Eval { action } => match action {
            EvalAction::Run { limit } => eval_cmd::run_evaluate(cfg, limit).await,
            EvalAction::Metrics { limit } => eval_cmd::run_metrics_list(cfg, limit).await,
        },
        Commands::Logs { action } => match action {
            LogsAction::List { limit } => logs::run_list(cfg, limit).await,
            LogsAction::Show { log_id } => logs::run_show(cfg, log_id).await,
        },
        Commands::Jobs { action } => match action {
            JobsAction::Create { filename } => {
                let pool = db::connect(cfg).await?;
                let store = sqlite_store::SqliteStore::new(pool);
                let now = chrono::Utc::now().timestamp();
                let job = shopsense_core::store::Store::create_job(&store, &filename, now).await?;
                println!("created job {} ({})", job.id, job.filename);
                store.pool().close().await;
                Ok(())
            }
            JobsAction::Show { job_id } => embed_cmd::run_job_show(cfg, job_id).await,
        },
        Commands::Stats => stats::run_stats(cfg).await,
        Commands::Serve => server::run_server(cfg).await,
    }
}
