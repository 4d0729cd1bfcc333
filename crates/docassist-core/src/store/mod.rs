//! Chunk store abstraction.
//!
//! The [`ChunkStore`] trait maps vector ids back to the persisted passages
//! they were built from. The SQLite backend lives in the app crate;
//! [`memory::InMemoryChunkStore`] serves tests and embedded use.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::TextRecord;

pub use memory::InMemoryChunkStore;

/// Lookup of text records by vector id.
///
/// # Contract
///
/// | Aspect | Guarantee |
/// |--------|-----------|
/// | Ordering | None. Callers must not rely on row order. |
/// | Missing ids | Silently absent from the result. |
/// | Duplicates in `ids` | At most one record per id. |
/// | Empty `ids` | Empty result, no backend round-trip required. |
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn fetch_records(&self, ids: &[i64]) -> Result<Vec<TextRecord>>;
}
