//! Score reconciliation.
//!
//! The chunk store returns records in no particular order, so scores cannot
//! be paired with records by position. [`reconcile`] re-attaches each
//! record's score by looking up its own `record_id` among the candidates the
//! index returned for this query.
//!
//! # Rules
//!
//! 1. Each record gets the score of the candidate with the same id.
//! 2. A record whose id is not among the candidates keeps `score = None`.
//! 3. A candidate id with no record is dropped.
//! 4. Output follows index rank; unresolved records go last in store order.

use std::collections::HashMap;

use crate::models::{Candidate, ScoredChunk, TextRecord};

/// Attach index scores to fetched records by candidate id.
pub fn reconcile(candidates: &[Candidate], records: Vec<TextRecord>) -> Vec<ScoredChunk> {
    let mut by_id: HashMap<i64, (usize, f64)> = HashMap::with_capacity(candidates.len());
    for (rank, c) in candidates.iter().enumerate() {
        by_id.entry(c.id).or_insert((rank, c.score));
    }

    let mut resolved: Vec<(usize, ScoredChunk)> = Vec::with_capacity(records.len());
    let mut unresolved: Vec<ScoredChunk> = Vec::new();

    for record in records {
        match by_id.get(&record.record_id) {
            Some(&(rank, score)) => resolved.push((rank, ScoredChunk::from_record(record, Some(score)))),
            None => {
                tracing::debug!(record_id = record.record_id, "record has no matching candidate");
                unresolved.push(ScoredChunk::from_record(record, None));
            }
        }
    }

    resolved.sort_by_key(|(rank, _)| *rank);
    resolved
        .into_iter()
        .map(|(_, chunk)| chunk)
        .chain(unresolved)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentLocation;

    fn record(id: i64, source: &str) -> TextRecord {
        TextRecord {
            record_id: id,
            chunk_id: id * 10,
            location: DocumentLocation::new(source, Some(1)),
            text: format!("text {id}"),
        }
    }

    #[test]
    fn test_scores_follow_ids_not_positions() {
        let candidates = vec![
            Candidate::new(7, 0.9),
            Candidate::new(3, 0.8),
            Candidate::new(5, 0.7),
        ];
        // Store returns rows in a different order than the index ranked them.
        let records = vec![record(5, "c.md"), record(7, "a.md"), record(3, "b.md")];

        let out = reconcile(&candidates, records);

        let pairs: Vec<(i64, Option<f64>)> = out.iter().map(|c| (c.record_id, c.score)).collect();
        assert_eq!(pairs, vec![(7, Some(0.9)), (3, Some(0.8)), (5, Some(0.7))]);
        assert_eq!(out[0].location.source, "a.md");
    }

    #[test]
    fn test_every_permutation_reconciles_identically() {
        let candidates = vec![
            Candidate::new(1, 0.95),
            Candidate::new(2, 0.85),
            Candidate::new(3, 0.75),
        ];
        let base = vec![record(1, "a"), record(2, "b"), record(3, "c")];
        let expected = reconcile(&candidates, base.clone());

        let perms: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];
        for p in perms {
            let shuffled: Vec<TextRecord> = p.iter().map(|&i| base[i].clone()).collect();
            assert_eq!(reconcile(&candidates, shuffled), expected);
        }
    }

    #[test]
    fn test_unmatched_record_gets_none_and_goes_last() {
        let candidates = vec![Candidate::new(1, 0.9)];
        let out = reconcile(&candidates, vec![record(42, "x"), record(1, "a")]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].record_id, 1);
        assert_eq!(out[1].record_id, 42);
        assert_eq!(out[1].score, None);
    }

    #[test]
    fn test_candidate_without_record_is_omitted() {
        let candidates = vec![Candidate::new(1, 0.9), Candidate::new(2, 0.8)];
        let out = reconcile(&candidates, vec![record(2, "b")]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].score, Some(0.8));
    }

    #[test]
    fn test_repeated_candidate_id_keeps_first() {
        let candidates = vec![Candidate::new(4, 0.9), Candidate::new(4, 0.1)];
        let out = reconcile(&candidates, vec![record(4, "d")]);
        assert_eq!(out[0].score, Some(0.9));
    }
}
