//! Structured retrieval diagnostics.
//!
//! A [`RetrievalTrace`] is filled in on every retrieval as the stages run.
//! The engine attaches it to the result only when the caller asked for it;
//! building it never changes what the engine decides.

use std::time::Duration;

use serde::Serialize;

use crate::models::ScoredChunk;
use crate::policy::{AbstainReason, Checkpoint, ScoreSummary};
use crate::retrieve::RetrievalParams;

/// Terminal state of a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Answered,
    Abstained,
}

/// Wall-clock time spent in each stage, in milliseconds.
///
/// Stages that did not run (because the engine abstained earlier) stay at
/// zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub embed_ms: f64,
    pub search_ms: f64,
    pub fetch_ms: f64,
    pub reduce_ms: f64,
    pub total_ms: f64,
}

/// Convert a duration to milliseconds, rounded to microsecond precision.
pub fn millis(d: Duration) -> f64 {
    (d.as_secs_f64() * 1_000_000.0).round() / 1000.0
}

/// One returned citation as it appears in the trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TracedChunk {
    pub record_id: i64,
    pub chunk_id: i64,
    pub source: String,
    pub page: Option<i64>,
    pub score: Option<f64>,
}

impl From<&ScoredChunk> for TracedChunk {
    fn from(c: &ScoredChunk) -> Self {
        Self {
            record_id: c.record_id,
            chunk_id: c.chunk_id,
            source: c.location.source.clone(),
            page: c.location.page,
            score: c.score,
        }
    }
}

/// Everything needed to explain why a query was answered or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalTrace {
    /// Embedding model the query was encoded with.
    pub model: String,
    /// Length of the query in characters. The text itself is not recorded.
    pub input_chars: usize,
    /// The thresholds and limits in effect.
    pub params: RetrievalParams,
    /// Candidate ids in index order.
    pub candidate_ids: Vec<i64>,
    /// Candidate scores in index order.
    pub scores: Vec<f64>,
    #[serde(flatten)]
    pub summary: ScoreSummary,
    /// Records returned by the chunk store.
    pub records_fetched: usize,
    pub dropped_low_score: usize,
    pub dropped_duplicates: usize,
    pub truncated: usize,
    pub outcome: Outcome,
    pub reason: Option<AbstainReason>,
    pub checkpoint: Option<Checkpoint>,
    pub returned_chunks: Vec<TracedChunk>,
    pub timings_ms: StageTimings,
}

impl RetrievalTrace {
    pub fn new(model: &str, input_chars: usize, params: &RetrievalParams) -> Self {
        Self {
            model: model.to_string(),
            input_chars,
            params: params.clone(),
            candidate_ids: Vec::new(),
            scores: Vec::new(),
            summary: ScoreSummary::default(),
            records_fetched: 0,
            dropped_low_score: 0,
            dropped_duplicates: 0,
            truncated: 0,
            outcome: Outcome::Answered,
            reason: None,
            checkpoint: None,
            returned_chunks: Vec::new(),
            timings_ms: StageTimings::default(),
        }
    }

    pub(crate) fn record_abstention(&mut self, reason: AbstainReason) {
        self.outcome = Outcome::Abstained;
        self.reason = Some(reason);
        self.checkpoint = Some(reason.checkpoint());
        self.returned_chunks.clear();
    }

    pub(crate) fn record_answer(&mut self, chunks: &[ScoredChunk]) {
        self.outcome = Outcome::Answered;
        self.reason = None;
        self.checkpoint = None;
        self.returned_chunks = chunks.iter().map(TracedChunk::from).collect();
    }
}
