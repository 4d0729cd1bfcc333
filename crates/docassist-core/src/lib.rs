//! # docassist core
//!
//! The retrieval decision engine for docassist: given a question, find the
//! passages that support an answer, or decide that the corpus holds no
//! sufficient evidence and say why.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies. Embedding, vector search, and text storage are reached
//! through the collaborator traits [`QueryEmbedder`](embedding::QueryEmbedder),
//! [`VectorIndex`](index::VectorIndex), and [`ChunkStore`](store::ChunkStore);
//! the application crate provides the concrete backends.
//!
//! ## Pipeline
//!
//! ```text
//! query ─▶ embed ─▶ index search ─▶ checkpoint 1 ─▶ fetch records
//!                                        │               │
//!                                        ▼               ▼
//!                                    abstain        reconcile ─▶ reduce ─▶ checkpoint 2 ─▶ result
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Candidates, text records, scored chunks |
//! | [`embedding`] | Query embedder trait and vector helpers |
//! | [`index`] | Vector index trait and exhaustive flat index |
//! | [`store`] | Chunk store trait and in-memory store |
//! | [`reconcile`] | Re-attach index scores to fetched records |
//! | [`policy`] | Two-checkpoint abstention policy |
//! | [`reduce`] | Row filter, location dedup, rank, truncate |
//! | [`trace`] | Structured diagnostic trace |
//! | [`retrieve`] | The engine entry point |
//! | [`chunk`] | Sliding-window page chunker |
//! | [`eval`] | Offline retrieval metrics |

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod index;
pub mod models;
pub mod policy;
pub mod reconcile;
pub mod reduce;
pub mod retrieve;
pub mod store;
pub mod trace;

pub use error::{ParamsError, RetrievalError};
pub use retrieve::{retrieve, RetrievalParams, RetrievalResult, Retriever};
