//! Deterministic feature-hashing embedder.
//!
//! Each lowercased alphanumeric token is hashed with SHA-256 into one of
//! `dims` buckets with a ±1 sign, and the resulting bag-of-words vector is
//! L2-normalized. No model, no network: identical texts embed identically,
//! and texts sharing no tokens are close to orthogonal. Used for tests and
//! air-gapped smoke runs, not for real semantic search.

use docassist_core::embedding::l2_normalize;
use sha2::{Digest, Sha256};

pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

pub fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    if dims == 0 {
        return v;
    }
    for token in tokenize(text) {
        let digest = Sha256::digest(token.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign;
    }
    l2_normalize(&mut v);
    v
}
