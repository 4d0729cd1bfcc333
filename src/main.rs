//! # docassist CLI
//!
//! The `docassist` binary ingests a document folder, builds the vector
//! index, and answers questions from the command line or over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! docassist --config ./config/docassist.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docassist init` | Create the SQLite database and schema |
//! | `docassist ingest <dir>` | Extract and chunk `.md`, `.txt`, and `.pdf` files |
//! | `docassist build-index` | Embed all chunks and write the vector index |
//! | `docassist ask "<question>"` | Retrieve citations for a question, or abstain |
//! | `docassist eval` | Score retrieval against a labelled JSONL set |
//! | `docassist stats` | Show document, chunk, and index counts |
//! | `docassist serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! docassist init
//! docassist ingest ./docs
//! docassist build-index
//! docassist ask "How long do refunds take?" --trace
//! docassist eval --data data/eval/gold.jsonl --fail-under 0.8
//! docassist serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docassist::eval_cmd::EvalArgs;
use docassist::{
    ask, config, eval_cmd, index_store, ingest, logging, migrate, server, stats,
};

/// docassist: citation-first question answering over a local document folder.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docassist.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docassist",
    about = "Citation-first retrieval over a local document folder",
    version,
    long_about = "docassist ingests Markdown, text, and PDF files, builds a dense vector index, \
    and answers questions with cited passages, abstaining when the evidence is weak."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docassist.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, chunks, chunk_embeddings). Safe to run repeatedly.
    Init,

    /// Ingest every supported file under a directory.
    ///
    /// Unchanged files are skipped; changed files replace their previous
    /// version. Run `build-index` afterwards.
    Ingest {
        /// Directory to scan recursively.
        dir: PathBuf,
    },

    /// Embed all chunks and write the vector index.
    BuildIndex,

    /// Answer a question with citations, or abstain.
    Ask {
        /// The question.
        question: String,

        /// Print the retrieval trace (candidates, scores, stage timings).
        #[arg(long)]
        trace: bool,

        /// Print the answer as JSON, in the same shape as `POST /ask`.
        #[arg(long)]
        json: bool,
    },

    /// Evaluate retrieval against a labelled JSONL set.
    ///
    /// Exits non-zero when `--fail-under` is given and Recall@K is below it.
    Eval {
        /// JSONL file of `{query, expected: [{source, page}]}` cases.
        #[arg(long, default_value = "data/eval/retrieval_gold.jsonl")]
        data: PathBuf,

        /// Where to write the JSON report.
        #[arg(long, default_value = "data/eval/report.json")]
        out: PathBuf,

        /// Number of top citations considered.
        #[arg(long, default_value_t = 5)]
        k: usize,

        /// Fail if Recall@K is below this threshold (0..1).
        #[arg(long)]
        fail_under: Option<f64>,

        /// Shift retrieved page numbers by this offset before matching.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        page_offset: i64,

        /// Accept a gold page within this many pages of the retrieved one.
        #[arg(long, default_value_t = 0)]
        page_tolerance: u32,
    },

    /// Show document, chunk, and index statistics.
    Stats,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { dir } => {
            ingest::run_ingest(&cfg, &dir).await?;
        }
        Commands::BuildIndex => {
            index_store::run_build_index(&cfg).await?;
        }
        Commands::Ask {
            question,
            trace,
            json,
        } => {
            ask::run_ask(&cfg, &question, trace, json).await?;
        }
        Commands::Eval {
            data,
            out,
            k,
            fail_under,
            page_offset,
            page_tolerance,
        } => {
            let args = EvalArgs {
                data,
                out,
                k,
                fail_under,
                page_offset,
                page_tolerance,
            };
            if !eval_cmd::run_eval(&cfg, &args).await? {
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
