//! # docassist
//!
//! Citation-first question answering over a local document folder.
//!
//! Documents are ingested into SQLite as page-level chunks, embedded into a
//! flat inner-product index, and queried through the evidence-gated
//! retrieval engine in [`docassist_core`]. Every answer either cites the
//! passages it came from or abstains with a named reason.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ ingest       │──▶│ SQLite       │◀──│ build-index  │──▶ index.bin
//! │ md/txt/pdf   │   │ chunks       │   │ embed chunks │    meta.json
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │ SqliteChunkStore
//!                           ▼
//!                  ┌─────────────────┐
//!                  │ Retriever       │◀── IndexBundle (FlatIndex + embedder)
//!                  │ docassist-core  │
//!                  └────────┬────────┘
//!                  ┌────────┴────────┐
//!                  ▼                 ▼
//!            ┌──────────┐      ┌──────────┐
//!            │   CLI    │      │   HTTP   │
//!            │ ask/eval │      │ POST/ask │
//!            └──────────┘      └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`extract`] | Page text extraction (Markdown, text, PDF) |
//! | [`ingest`] | Directory ingestion |
//! | [`embedding`] | Embedding providers |
//! | [`index_store`] | Index artifacts, [`index_store::IndexBundle`], [`index_store::SharedIndex`] |
//! | [`sqlite_store`] | SQLite-backed chunk store |
//! | [`ask`] | Answer templating and the `ask` command |
//! | [`eval_cmd`] | The `eval` command |
//! | [`stats`] | The `stats` command |
//! | [`server`] | HTTP API |

pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod eval_cmd;
pub mod extract;
pub mod index_store;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
pub mod stats;
