//! In-memory [`ChunkStore`] implementation for tests and embedded use.
//!
//! Records live in a `HashMap` behind `std::sync::RwLock`. Results come back
//! in descending record-id order, not in request order.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::ChunkStore;
use crate::models::TextRecord;

/// In-memory chunk store keyed by record id.
pub struct InMemoryChunkStore {
    records: RwLock<HashMap<i64, TextRecord>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the record stored under `record.record_id`.
    pub fn insert(&self, record: TextRecord) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("chunk store lock poisoned"))?;
        records.insert(record.record_id, record);
        Ok(())
    }

    /// Remove a record, returning it if present.
    pub fn remove(&self, record_id: i64) -> Result<Option<TextRecord>> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("chunk store lock poisoned"))?;
        Ok(records.remove(&record_id))
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<TextRecord> for InMemoryChunkStore {
    fn from_iter<I: IntoIterator<Item = TextRecord>>(iter: I) -> Self {
        let records = iter.into_iter().map(|r| (r.record_id, r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn fetch_records(&self, ids: &[i64]) -> Result<Vec<TextRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("chunk store lock poisoned"))?;
        let wanted: BTreeSet<i64> = ids.iter().copied().collect();
        Ok(wanted
            .iter()
            .rev()
            .filter_map(|id| records.get(id).cloned())
            .collect())
    }
}
