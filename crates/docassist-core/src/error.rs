//! Error types for the retrieval engine.
//!
//! "Not enough evidence" is never an error: it is a successful
//! [`RetrievalResult`](crate::retrieve::RetrievalResult) with
//! `abstained = true`. The variants here cover bad input and faults in the
//! collaborators (embedder, index, store).

use thiserror::Error;

/// A [`RetrievalParams`](crate::retrieve::RetrievalParams) field that failed
/// validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    #[error("search_candidates_k must be at least 1")]
    ZeroCandidates,
    #[error("max_citations must be at least 1")]
    ZeroCitations,
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("invalid retrieval parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("query is empty")]
    EmptyQuery,

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("query vector has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector search failed: {0:#}")]
    Search(anyhow::Error),

    #[error("chunk store lookup failed: {0:#}")]
    Store(anyhow::Error),
}

impl RetrievalError {
    /// True when the caller supplied bad input, as opposed to a backend fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidParams(_) | Self::EmptyQuery)
    }
}
