//! Offline retrieval evaluation.
//!
//! Scores the engine against a labelled set of questions. Each case lists
//! the locations that should be cited; a case with no expected locations is
//! a no-evidence case, where the right behavior is to abstain.
//!
//! | Metric | Over | Meaning |
//! |--------|------|---------|
//! | `recall_at_k` | gold cases | share with an expected location in the top `k` |
//! | `mrr` | gold cases | mean reciprocal rank of the first match (0 on miss) |
//! | `no_evidence_accuracy` | no-evidence cases | share that returned nothing |
//! | `false_evidence_rate` | no-evidence cases | share that returned citations |
//!
//! A metric is `None` when its case set is empty.
//!
//! Sources match on their lowercased file name, so `docs/Policy.PDF` and
//! `policy.pdf` are the same document. Retrieved pages can be shifted by
//! `page_offset` and matched within `page_tolerance` pages of a gold page.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::DocumentLocation;
use crate::policy::AbstainReason;
use crate::retrieve::RetrievalResult;

/// One labelled question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub query: String,
    #[serde(default)]
    pub expected: Vec<DocumentLocation>,
}

impl EvalCase {
    pub fn has_gold(&self) -> bool {
        !self.expected.is_empty()
    }
}

/// Parse a JSONL file body, skipping blank lines.
pub fn parse_cases(jsonl: &str) -> Result<Vec<EvalCase>> {
    jsonl
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line.trim()).with_context(|| format!("line {}: invalid eval case", i + 1))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchOptions {
    /// Only the first `k` retrieved locations count.
    pub k: usize,
    /// Added to every retrieved page before matching.
    pub page_offset: i64,
    /// Accept a gold page within this many pages of the retrieved one.
    pub page_tolerance: u32,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            k: 5,
            page_offset: 0,
            page_tolerance: 0,
        }
    }
}

fn norm_source(source: &str) -> String {
    Path::new(source.trim())
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// 1-based rank of the first retrieved location matching a gold location,
/// or `None` if nothing in the top `k` matches.
pub fn first_match_rank(
    retrieved: &[DocumentLocation],
    expected: &[DocumentLocation],
    opts: &MatchOptions,
) -> Option<usize> {
    let gold: HashSet<(String, Option<i64>)> = expected
        .iter()
        .map(|e| (norm_source(&e.source), e.page))
        .collect();

    for (i, loc) in retrieved.iter().take(opts.k).enumerate() {
        let source = norm_source(&loc.source);
        let page = loc.page.map(|p| p + opts.page_offset);

        if gold.contains(&(source.clone(), page)) {
            return Some(i + 1);
        }
        if let Some(p) = page {
            let tolerance = i64::from(opts.page_tolerance);
            let near = (1..=tolerance).any(|d| {
                gold.contains(&(source.clone(), Some(p - d)))
                    || gold.contains(&(source.clone(), Some(p + d)))
            });
            if near {
                return Some(i + 1);
            }
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    Gold,
    NoEvidence,
}

/// Per-case record in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseDetail {
    pub query: String,
    pub kind: CaseKind,
    pub expected: Vec<DocumentLocation>,
    pub retrieved: Vec<DocumentLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_empty: Option<bool>,
    pub reason: Option<AbstainReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalReport {
    pub k: usize,
    pub cases_total: usize,
    pub cases_scored_gold: usize,
    pub recall_at_k: Option<f64>,
    pub mrr: Option<f64>,
    pub no_evidence_total: usize,
    pub no_evidence_accuracy: Option<f64>,
    pub false_evidence_rate: Option<f64>,
    pub page_offset: i64,
    pub page_tolerance: u32,
    pub details: Vec<CaseDetail>,
}

impl EvalReport {
    /// True when recall is known and below `threshold`.
    pub fn fails_under(&self, threshold: f64) -> bool {
        matches!(self.recall_at_k, Some(r) if r < threshold)
    }
}

/// Accumulates case outcomes into an [`EvalReport`].
#[derive(Debug)]
pub struct Evaluator {
    opts: MatchOptions,
    gold_total: usize,
    gold_hits: usize,
    rr_sum: f64,
    ne_total: usize,
    ne_correct: usize,
    details: Vec<CaseDetail>,
}

impl Evaluator {
    pub fn new(opts: MatchOptions) -> Self {
        Self {
            opts,
            gold_total: 0,
            gold_hits: 0,
            rr_sum: 0.0,
            ne_total: 0,
            ne_correct: 0,
            details: Vec::new(),
        }
    }

    pub fn record(&mut self, case: &EvalCase, result: &RetrievalResult) {
        let retrieved: Vec<DocumentLocation> = result
            .chunks
            .iter()
            .take(self.opts.k)
            .map(|c| c.location.clone())
            .collect();

        if !case.has_gold() {
            self.ne_total += 1;
            let predicted_empty = result.chunks.is_empty();
            if predicted_empty {
                self.ne_correct += 1;
            }
            self.details.push(CaseDetail {
                query: case.query.clone(),
                kind: CaseKind::NoEvidence,
                expected: Vec::new(),
                retrieved,
                hit: None,
                rr: None,
                predicted_empty: Some(predicted_empty),
                reason: result.reason,
            });
            return;
        }

        self.gold_total += 1;
        let rank = first_match_rank(&retrieved, &case.expected, &self.opts);
        let rr = rank.map_or(0.0, |r| 1.0 / r as f64);
        if rank.is_some() {
            self.gold_hits += 1;
            self.rr_sum += rr;
        }
        self.details.push(CaseDetail {
            query: case.query.clone(),
            kind: CaseKind::Gold,
            expected: case.expected.clone(),
            retrieved,
            hit: Some(rank.is_some()),
            rr: Some(rr),
            predicted_empty: None,
            reason: result.reason,
        });
    }

    pub fn finish(self) -> EvalReport {
        let ratio = |num: f64, den: usize| (den > 0).then(|| num / den as f64);
        EvalReport {
            k: self.opts.k,
            cases_total: self.gold_total + self.ne_total,
            cases_scored_gold: self.gold_total,
            recall_at_k: ratio(self.gold_hits as f64, self.gold_total),
            mrr: ratio(self.rr_sum, self.gold_total),
            no_evidence_total: self.ne_total,
            no_evidence_accuracy: ratio(self.ne_correct as f64, self.ne_total),
            false_evidence_rate: ratio((self.ne_total - self.ne_correct) as f64, self.ne_total),
            page_offset: self.opts.page_offset,
            page_tolerance: self.opts.page_tolerance,
            details: self.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoredChunk;

    fn loc(source: &str, page: Option<i64>) -> DocumentLocation {
        DocumentLocation::new(source, page)
    }

    fn answered(locations: &[DocumentLocation]) -> RetrievalResult {
        RetrievalResult {
            chunks: locations
                .iter()
                .enumerate()
                .map(|(i, l)| ScoredChunk {
                    record_id: i as i64,
                    chunk_id: i as i64,
                    location: l.clone(),
                    text: String::new(),
                    score: Some(0.9 - i as f64 * 0.1),
                })
                .collect(),
            abstained: false,
            reason: None,
            trace: None,
        }
    }

    fn abstained() -> RetrievalResult {
        RetrievalResult {
            chunks: Vec::new(),
            abstained: true,
            reason: Some(AbstainReason::NoEvidenceLowTopScore),
            trace: None,
        }
    }

    #[test]
    fn test_parse_cases_skips_blank_lines() {
        let body = r#"{"query": "refunds?", "expected": [{"source": "policy.pdf", "page": 2}]}

{"query": "weather on mars"}
"#;
        let cases = parse_cases(body).unwrap();
        assert_eq!(cases.len(), 2);
        assert!(cases[0].has_gold());
        assert!(!cases[1].has_gold());
    }

    #[test]
    fn test_parse_cases_reports_line() {
        let err = parse_cases("{\"query\": \"a\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_source_matches_on_lowercased_basename() {
        let rank = first_match_rank(
            &[loc("other.pdf", Some(1)), loc("manuals/Policy.PDF", Some(2))],
            &[loc("policy.pdf", Some(2))],
            &MatchOptions::default(),
        );
        assert_eq!(rank, Some(2));
    }

    #[test]
    fn test_page_offset_shifts_retrieved_pages() {
        let opts = MatchOptions {
            page_offset: 1,
            ..MatchOptions::default()
        };
        assert_eq!(
            first_match_rank(&[loc("a.pdf", Some(1))], &[loc("a.pdf", Some(2))], &opts),
            Some(1)
        );
        assert_eq!(
            first_match_rank(&[loc("a.pdf", Some(2))], &[loc("a.pdf", Some(2))], &opts),
            None
        );
    }

    #[test]
    fn test_page_tolerance() {
        let opts = MatchOptions {
            page_tolerance: 1,
            ..MatchOptions::default()
        };
        assert_eq!(
            first_match_rank(&[loc("a.pdf", Some(4))], &[loc("a.pdf", Some(5))], &opts),
            Some(1)
        );
        assert_eq!(
            first_match_rank(&[loc("a.pdf", Some(3))], &[loc("a.pdf", Some(5))], &opts),
            None
        );
    }

    #[test]
    fn test_unpaged_locations_match_each_other() {
        assert_eq!(
            first_match_rank(&[loc("notes.md", None)], &[loc("notes.md", None)], &MatchOptions::default()),
            Some(1)
        );
    }

    #[test]
    fn test_only_top_k_counts() {
        let opts = MatchOptions {
            k: 1,
            ..MatchOptions::default()
        };
        assert_eq!(
            first_match_rank(
                &[loc("x.pdf", Some(1)), loc("a.pdf", Some(1))],
                &[loc("a.pdf", Some(1))],
                &opts
            ),
            None
        );
    }

    #[test]
    fn test_report_metrics() {
        let mut eval = Evaluator::new(MatchOptions::default());
        let gold_a = EvalCase {
            query: "a".into(),
            expected: vec![loc("a.pdf", Some(1))],
        };
        let gold_b = EvalCase {
            query: "b".into(),
            expected: vec![loc("b.pdf", Some(1))],
        };
        let none = EvalCase {
            query: "c".into(),
            expected: vec![],
        };

        eval.record(&gold_a, &answered(&[loc("a.pdf", Some(1))]));
        eval.record(&gold_b, &answered(&[loc("z.pdf", Some(1)), loc("b.pdf", Some(1))]));
        eval.record(&none, &abstained());
        eval.record(&none, &answered(&[loc("z.pdf", Some(9))]));

        let report = eval.finish();
        assert_eq!(report.cases_total, 4);
        assert_eq!(report.cases_scored_gold, 2);
        assert_eq!(report.recall_at_k, Some(1.0));
        assert!((report.mrr.unwrap() - 0.75).abs() < 1e-9);
        assert_eq!(report.no_evidence_total, 2);
        assert_eq!(report.no_evidence_accuracy, Some(0.5));
        assert_eq!(report.false_evidence_rate, Some(0.5));
        assert_eq!(report.details[2].reason, Some(AbstainReason::NoEvidenceLowTopScore));
        assert!(!report.fails_under(0.9));
    }

    #[test]
    fn test_empty_sets_have_no_metrics() {
        let report = Evaluator::new(MatchOptions::default()).finish();
        assert_eq!(report.recall_at_k, None);
        assert_eq!(report.no_evidence_accuracy, None);
        assert!(!report.fails_under(1.0));
    }

    #[test]
    fn test_missed_gold_fails_threshold() {
        let mut eval = Evaluator::new(MatchOptions::default());
        let case = EvalCase {
            query: "q".into(),
            expected: vec![loc("a.pdf", Some(1))],
        };
        eval.record(&case, &abstained());
        let report = eval.finish();
        assert_eq!(report.recall_at_k, Some(0.0));
        assert_eq!(report.details[0].rr, Some(0.0));
        assert!(report.fails_under(0.5));
    }
}
