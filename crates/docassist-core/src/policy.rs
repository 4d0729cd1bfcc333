//! Abstention policy.
//!
//! Decides whether the retrieved evidence is strong enough to answer. The
//! policy runs at two named checkpoints:
//!
//! | Checkpoint | Input | Reasons it can produce |
//! |------------|-------|------------------------|
//! | [`Evidence`](Checkpoint::Evidence) | raw index scores | `no_evidence_empty_search`, `no_evidence_low_top_score`, `no_evidence_low_score_gap_near_threshold` |
//! | [`Survivors`](Checkpoint::Survivors) | reduced chunk list | `all_candidates_filtered_by_min_row_score` |
//!
//! Evidence rules are evaluated in order and the first match wins:
//!
//! 1. No candidates at all.
//! 2. `top1 < min_top_score`.
//! 3. A second candidate exists, `top1 < min_top_score + min_top_score_margin`,
//!    and `top1 - top2 < min_score_gap`.
//!
//! A lone candidate that clears `min_top_score` is never considered
//! ambiguous, since there is no runner-up to be confused with.

use serde::Serialize;

use crate::models::Candidate;

/// Where in the pipeline an abstention was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    /// After vector search, before any record is fetched.
    Evidence,
    /// After row filtering and deduplication.
    Survivors,
}

/// Why the engine declined to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbstainReason {
    NoEvidenceEmptySearch,
    NoEvidenceLowTopScore,
    NoEvidenceLowScoreGapNearThreshold,
    AllCandidatesFilteredByMinRowScore,
}

impl AbstainReason {
    /// The stable identifier used in traces, logs, and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoEvidenceEmptySearch => "no_evidence_empty_search",
            Self::NoEvidenceLowTopScore => "no_evidence_low_top_score",
            Self::NoEvidenceLowScoreGapNearThreshold => "no_evidence_low_score_gap_near_threshold",
            Self::AllCandidatesFilteredByMinRowScore => "all_candidates_filtered_by_min_row_score",
        }
    }

    pub fn checkpoint(&self) -> Checkpoint {
        match self {
            Self::AllCandidatesFilteredByMinRowScore => Checkpoint::Survivors,
            _ => Checkpoint::Evidence,
        }
    }
}

impl std::fmt::Display for AbstainReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds applied at the evidence checkpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvidenceThresholds {
    pub min_top_score: f64,
    pub min_top_score_margin: f64,
    pub min_score_gap: f64,
}

/// Top-of-list statistics over the raw index scores.
///
/// Computed once per query and shared by the policy and the trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub top1: Option<f64>,
    pub top2: Option<f64>,
    /// `top1 - top2`, present only when both exist.
    pub gap: Option<f64>,
}

impl ScoreSummary {
    pub fn from_candidates(candidates: &[Candidate]) -> Self {
        let top1 = candidates.first().map(|c| c.score);
        let top2 = candidates.get(1).map(|c| c.score);
        let gap = match (top1, top2) {
            (Some(a), Some(b)) => Some(a - b),
            _ => None,
        };
        Self { top1, top2, gap }
    }
}

/// Outcome of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Abstain(AbstainReason),
}

/// First checkpoint: is the raw score distribution strong enough to bother
/// fetching records?
pub fn check_evidence(summary: &ScoreSummary, thresholds: &EvidenceThresholds) -> Decision {
    let Some(top1) = summary.top1 else {
        return Decision::Abstain(AbstainReason::NoEvidenceEmptySearch);
    };

    if top1.is_nan() || top1 < thresholds.min_top_score {
        return Decision::Abstain(AbstainReason::NoEvidenceLowTopScore);
    }

    if let Some(gap) = summary.gap {
        let near_threshold = top1 < thresholds.min_top_score + thresholds.min_top_score_margin;
        if near_threshold && (gap.is_nan() || gap < thresholds.min_score_gap) {
            return Decision::Abstain(AbstainReason::NoEvidenceLowScoreGapNearThreshold);
        }
    }

    Decision::Proceed
}

/// Second checkpoint: did anything survive reduction?
pub fn check_survivors(surviving: usize) -> Decision {
    if surviving == 0 {
        Decision::Abstain(AbstainReason::AllCandidatesFilteredByMinRowScore)
    } else {
        Decision::Proceed
    }
}
