//! The retrieval decision engine.
//!
//! [`Retriever::retrieve`] runs one query through the full pipeline and
//! returns either a bounded, ranked citation list or an abstention with a
//! reason. The collaborators are borrowed for the duration of the call;
//! the engine holds no state between calls.
//!
//! # Stages
//!
//! ```text
//! Start ─▶ Searched ─┬─▶ Abstained                       (checkpoint 1)
//!                    └─▶ Reconciled ─▶ Reduced ─┬─▶ Abstained  (checkpoint 2)
//!                                               └─▶ Done
//! ```
//!
//! 1. Validate parameters and reject an empty query.
//! 2. Embed the query and search the index for `search_candidates_k` hits.
//! 3. Evidence checkpoint on the raw scores; abstain early if weak.
//! 4. Fetch text records for the candidate ids.
//! 5. Reconcile scores by id, then filter, dedup, rank, and truncate.
//! 6. Survivors checkpoint; abstain if nothing is left.
//!
//! Abstention is a normal, successful outcome. Errors are reserved for bad
//! input and collaborator failures.

use std::time::Instant;

use serde::Serialize;

use crate::embedding::QueryEmbedder;
use crate::error::{ParamsError, RetrievalError};
use crate::index::VectorIndex;
use crate::models::ScoredChunk;
use crate::policy::{
    check_evidence, check_survivors, AbstainReason, Checkpoint, Decision, EvidenceThresholds,
    ScoreSummary,
};
use crate::reconcile::reconcile;
use crate::reduce::reduce;
use crate::store::ChunkStore;
use crate::trace::{millis, RetrievalTrace};

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalParams {
    /// Number of nearest neighbors to request from the index.
    pub search_candidates_k: usize,
    /// Maximum citations to return.
    pub max_citations: usize,
    /// The best candidate must score at least this much.
    pub min_top_score: f64,
    /// Width of the band above `min_top_score` where a small gap counts as
    /// ambiguous.
    pub min_top_score_margin: f64,
    /// Minimum `top1 - top2` inside the ambiguity band.
    pub min_score_gap: f64,
    /// Individual chunks scoring below this are dropped.
    pub min_row_score: f64,
    /// Attach the [`RetrievalTrace`] to the result.
    pub include_trace: bool,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            search_candidates_k: 15,
            max_citations: 5,
            min_top_score: 0.80,
            min_top_score_margin: 0.05,
            min_score_gap: 0.02,
            min_row_score: 0.30,
            include_trace: false,
        }
    }
}

impl RetrievalParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.search_candidates_k == 0 {
            return Err(ParamsError::ZeroCandidates);
        }
        if self.max_citations == 0 {
            return Err(ParamsError::ZeroCitations);
        }
        for (field, value) in [
            ("min_top_score", self.min_top_score),
            ("min_top_score_margin", self.min_top_score_margin),
            ("min_score_gap", self.min_score_gap),
            ("min_row_score", self.min_row_score),
        ] {
            if !value.is_finite() {
                return Err(ParamsError::NotFinite { field, value });
            }
        }
        for (field, value) in [
            ("min_top_score_margin", self.min_top_score_margin),
            ("min_score_gap", self.min_score_gap),
        ] {
            if value < 0.0 {
                return Err(ParamsError::Negative { field, value });
            }
        }
        Ok(())
    }

    pub fn evidence_thresholds(&self) -> EvidenceThresholds {
        EvidenceThresholds {
            min_top_score: self.min_top_score,
            min_top_score_margin: self.min_top_score_margin,
            min_score_gap: self.min_score_gap,
        }
    }
}

/// The engine's answer to one query.
///
/// Either `abstained` is false, `reason` is `None`, and `chunks` holds at
/// least one citation; or `abstained` is true, `reason` is set, and
/// `chunks` is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
    pub abstained: bool,
    pub reason: Option<AbstainReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<RetrievalTrace>,
}

impl RetrievalResult {
    fn answered(chunks: Vec<ScoredChunk>, trace: Option<RetrievalTrace>) -> Self {
        Self {
            chunks,
            abstained: false,
            reason: None,
            trace,
        }
    }

    fn abstain(reason: AbstainReason, trace: Option<RetrievalTrace>) -> Self {
        Self {
            chunks: Vec::new(),
            abstained: true,
            reason: Some(reason),
            trace,
        }
    }

    /// The checkpoint that produced the abstention, if any.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.reason.map(|r| r.checkpoint())
    }
}

/// The retrieval engine bound to its three collaborators.
#[derive(Clone, Copy)]
pub struct Retriever<'a> {
    embedder: &'a dyn QueryEmbedder,
    index: &'a dyn VectorIndex,
    store: &'a dyn ChunkStore,
}

impl<'a> Retriever<'a> {
    pub fn new(
        embedder: &'a dyn QueryEmbedder,
        index: &'a dyn VectorIndex,
        store: &'a dyn ChunkStore,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
        }
    }

    /// Run one query through the pipeline.
    pub async fn retrieve(
        &self,
        query: &str,
        params: &RetrievalParams,
    ) -> Result<RetrievalResult, RetrievalError> {
        params.validate()?;
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let started = Instant::now();
        let mut trace = RetrievalTrace::new(self.embedder.model_name(), query.chars().count(), params);

        // Searched
        let t = Instant::now();
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(RetrievalError::Embedding)?;
        trace.timings_ms.embed_ms = millis(t.elapsed());
        if vector.len() != self.index.dims() {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.index.dims(),
                actual: vector.len(),
            });
        }

        let t = Instant::now();
        let candidates = self
            .index
            .search(&vector, params.search_candidates_k)
            .await
            .map_err(RetrievalError::Search)?;
        trace.timings_ms.search_ms = millis(t.elapsed());

        let summary = ScoreSummary::from_candidates(&candidates);
        trace.candidate_ids = candidates.iter().map(|c| c.id).collect();
        trace.scores = candidates.iter().map(|c| c.score).collect();
        trace.summary = summary;
        tracing::debug!(
            candidates = candidates.len(),
            top1 = ?summary.top1,
            gap = ?summary.gap,
            "vector search complete"
        );

        if let Decision::Abstain(reason) = check_evidence(&summary, &params.evidence_thresholds()) {
            return Ok(finish_abstained(reason, trace, started, params));
        }

        // Reconciled
        let ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();
        let t = Instant::now();
        let records = self
            .store
            .fetch_records(&ids)
            .await
            .map_err(RetrievalError::Store)?;
        trace.timings_ms.fetch_ms = millis(t.elapsed());
        trace.records_fetched = records.len();
        if records.len() < ids.len() {
            tracing::debug!(
                requested = ids.len(),
                fetched = records.len(),
                "some candidates have no stored record"
            );
        }

        // Reduced
        let t = Instant::now();
        let reconciled = reconcile(&candidates, records);
        let reduction = reduce(reconciled, params.min_row_score, params.max_citations);
        trace.timings_ms.reduce_ms = millis(t.elapsed());
        trace.dropped_low_score = reduction.dropped_low_score;
        trace.dropped_duplicates = reduction.dropped_duplicates;
        trace.truncated = reduction.truncated;

        if let Decision::Abstain(reason) = check_survivors(reduction.chunks.len()) {
            return Ok(finish_abstained(reason, trace, started, params));
        }

        // Done
        trace.record_answer(&reduction.chunks);
        trace.timings_ms.total_ms = millis(started.elapsed());
        tracing::info!(
            abstained = false,
            chunks = reduction.chunks.len(),
            top1 = ?summary.top1,
            total_ms = trace.timings_ms.total_ms,
            "retrieval answered"
        );
        let trace = params.include_trace.then_some(trace);
        Ok(RetrievalResult::answered(reduction.chunks, trace))
    }
}

fn finish_abstained(
    reason: AbstainReason,
    mut trace: RetrievalTrace,
    started: Instant,
    params: &RetrievalParams,
) -> RetrievalResult {
    trace.record_abstention(reason);
    trace.timings_ms.total_ms = millis(started.elapsed());
    tracing::info!(
        abstained = true,
        reason = reason.as_str(),
        checkpoint = ?reason.checkpoint(),
        top1 = ?trace.summary.top1,
        total_ms = trace.timings_ms.total_ms,
        "retrieval abstained"
    );
    let trace = params.include_trace.then_some(trace);
    RetrievalResult::abstain(reason, trace)
}

/// Convenience wrapper around [`Retriever::retrieve`].
pub async fn retrieve(
    embedder: &dyn QueryEmbedder,
    index: &dyn VectorIndex,
    store: &dyn ChunkStore,
    query: &str,
    params: &RetrievalParams,
) -> Result<RetrievalResult, RetrievalError> {
    Retriever::new(embedder, index, store)
        .retrieve(query, params)
        .await
}
