//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the engine's view of nearest-neighbor
//! search: a query vector goes in, an ordered list of
//! [`Candidate`](crate::models::Candidate)s comes out.
//!
//! Implementations must be `Send + Sync` and safe to search concurrently
//! through a shared reference once built.

pub mod flat;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Candidate;

pub use flat::FlatIndex;

/// Read-only nearest-neighbor search.
///
/// # Contract
///
/// - At most `k` candidates are returned.
/// - Candidates are ordered by score, highest first.
/// - Candidate ids are the vector ids the chunk store was populated with.
/// - An empty index, or `k == 0`, yields an empty list rather than an error.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality of the indexed vectors.
    fn dims(&self) -> usize;
    /// Number of indexed vectors.
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Return the `k` nearest neighbors of `query`.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>>;
}
