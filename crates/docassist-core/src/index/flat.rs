//! Exhaustive inner-product index.
//!
//! Stores every vector in one contiguous row-major buffer and scores all of
//! them for each query. Vectors are expected to be L2-normalized on the way
//! in, so the inner product is the cosine similarity.
//!
//! Row ids are the insertion positions `0..len`. Ties are broken by the
//! lower id so that results are fully deterministic.


use anyhow::{bail, Result};
use async_trait::async_trait;

use super::VectorIndex;
use crate::embedding::dot;
use crate::models::Candidate;

/// Brute-force inner-product index over a flat `f32` buffer.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    /// Build from a row-major buffer of `n * dims` floats.
    pub fn from_flat(dims: usize, data: Vec<f32>) -> Result<Self> {
        if dims == 0 {
            bail!("index dimensionality must be at least 1");
        }
        if data.len() % dims != 0 {
            bail!(
                "index buffer holds {} floats, not a multiple of {} dimensions",
                data.len(),
                dims
            );
        }
        Ok(Self { dims, data })
    }

    /// Build from individual vectors, all of which must have `dims` entries.
    pub fn from_vectors(dims: usize, vectors: &[Vec<f32>]) -> Result<Self> {
        let mut index = Self::new(dims);
        for v in vectors {
            index.add(v)?;
        }
        Ok(index)
    }

    /// Append one vector. Its id is the previous `len()`.
    pub fn add(&mut self, vector: &[f32]) -> Result<i64> {
        if vector.len() != self.dims {
            bail!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dims
            );
        }
        let id = self.len() as i64;
        self.data.extend_from_slice(vector);
        Ok(id)
    }

    /// The raw row-major buffer, for persisting.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dims..(i + 1) * self.dims]
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>> {
        if query.len() != self.dims {
            bail!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dims
            );
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        // Non-finite scores come from damaged rows and never count as hits.
        let mut scored: Vec<Candidate> = (0..self.len())
            .map(|i| Candidate::new(i as i64, dot(query, self.row(i)) as f64))
            .filter(|c| c.score.is_finite())
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        scored.truncate(k);
        Ok(scored)
    }
}
