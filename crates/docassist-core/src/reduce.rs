//! Candidate reduction.
//!
//! Turns the reconciled chunk list into the final citation list:
//!
//! 1. Drop chunks whose score is present and below `min_row_score`.
//!    Chunks with an unresolved (`None`) score are kept.
//! 2. Deduplicate by [`DocumentLocation`]: the higher score wins, `None`
//!    ranks below any number, and on equal scores the first chunk
//!    encountered wins.
//! 3. Stable sort by score, highest first, `None` last.
//! 4. Truncate to `max_citations`.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{DocumentLocation, ScoredChunk};

/// Result of [`reduce`], with counts for the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub chunks: Vec<ScoredChunk>,
    /// Chunks removed by the `min_row_score` filter.
    pub dropped_low_score: usize,
    /// Chunks removed because a better chunk shared their location.
    pub dropped_duplicates: usize,
    /// Chunks removed by the `max_citations` cap.
    pub truncated: usize,
}

/// Descending order with `None` after every present score.
///
/// Total over all `f64` values, so a stray NaN cannot break the sort.
pub fn compare_scores_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Strictly better, in the sense used by deduplication.
fn beats(challenger: Option<f64>, incumbent: Option<f64>) -> bool {
    compare_scores_desc(challenger, incumbent) == Ordering::Less
}

pub fn reduce(chunks: Vec<ScoredChunk>, min_row_score: f64, max_citations: usize) -> Reduction {
    let before_filter = chunks.len();
    let kept: Vec<ScoredChunk> = chunks
        .into_iter()
        .filter(|c| c.score.map_or(true, |s| s >= min_row_score))
        .collect();
    let dropped_low_score = before_filter - kept.len();

    let before_dedup = kept.len();
    let mut slot_of: HashMap<DocumentLocation, usize> = HashMap::new();
    let mut unique: Vec<ScoredChunk> = Vec::with_capacity(kept.len());
    for chunk in kept {
        match slot_of.get(&chunk.location) {
            Some(&slot) => {
                if beats(chunk.score, unique[slot].score) {
                    unique[slot] = chunk;
                }
            }
            None => {
                slot_of.insert(chunk.location.clone(), unique.len());
                unique.push(chunk);
            }
        }
    }
    let dropped_duplicates = before_dedup - unique.len();

    unique.sort_by(|a, b| compare_scores_desc(a.score, b.score));

    let truncated = unique.len().saturating_sub(max_citations);
    unique.truncate(max_citations);

    Reduction {
        chunks: unique,
        dropped_low_score,
        dropped_duplicates,
        truncated,
    }
}
