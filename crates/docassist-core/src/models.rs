//! Data types that flow through the retrieval pipeline.
//!
//! All of these are built fresh for each query; nothing here outlives a
//! single retrieval call.

use serde::{Deserialize, Serialize};

/// A nearest-neighbor hit returned by a [`VectorIndex`](crate::index::VectorIndex).
///
/// `id` is the vector's row id inside the index, which the chunk store maps
/// back to a text record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: i64,
    /// Similarity score; higher is more similar.
    pub score: f64,
}

impl Candidate {
    pub fn new(id: i64, score: f64) -> Self {
        Self { id, score }
    }
}

/// Where a passage came from: a source document and, for paginated
/// formats, a 1-based page number.
///
/// Two chunks with equal locations are considered duplicates by the
/// reducer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentLocation {
    /// Document path relative to the ingested root.
    pub source: String,
    /// Page number, `None` for unpaginated formats.
    pub page: Option<i64>,
}

impl DocumentLocation {
    pub fn new(source: impl Into<String>, page: Option<i64>) -> Self {
        Self {
            source: source.into(),
            page,
        }
    }
}

impl std::fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.page {
            Some(p) => write!(f, "{} p.{}", self.source, p),
            None => write!(f, "{}", self.source),
        }
    }
}

/// A persisted passage as returned by a [`ChunkStore`](crate::store::ChunkStore).
#[derive(Debug, Clone, PartialEq)]
pub struct TextRecord {
    /// The vector id this record was indexed under.
    pub record_id: i64,
    /// The store's own chunk primary key.
    pub chunk_id: i64,
    pub location: DocumentLocation,
    pub text: String,
}

/// A text record with its similarity score re-attached.
///
/// `score` is `None` only when the record's id could not be matched to a
/// candidate returned by the index for the current query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub record_id: i64,
    pub chunk_id: i64,
    pub location: DocumentLocation,
    pub text: String,
    pub score: Option<f64>,
}

impl ScoredChunk {
    pub fn from_record(record: TextRecord, score: Option<f64>) -> Self {
        Self {
            record_id: record.record_id,
            chunk_id: record.chunk_id,
            location: record.location,
            text: record.text,
            score,
        }
    }
}
