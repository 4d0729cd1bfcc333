//! The `eval` command: run a labelled question set through the engine and
//! write a JSON report.

use anyhow::{Context, Result};
use docassist_core::eval::{parse_cases, EvalReport, Evaluator, MatchOptions};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::db;
use crate::index_store::IndexBundle;
use crate::sqlite_store::SqliteChunkStore;

#[derive(Debug, Clone)]
pub struct EvalArgs {
    pub data: PathBuf,
    pub out: PathBuf,
    pub k: usize,
    pub fail_under: Option<f64>,
    pub page_offset: i64,
    pub page_tolerance: u32,
}

/// Run the evaluation. Returns `false` when recall is below `fail_under`.
pub async fn run_eval(config: &Config, args: &EvalArgs) -> Result<bool> {
    let body = std::fs::read_to_string(&args.data)
        .with_context(|| format!("Failed to read eval data {}", args.data.display()))?;
    let cases = parse_cases(&body)
        .with_context(|| format!("Failed to parse {}", args.data.display()))?;

    let bundle = IndexBundle::load(config)?;
    let pool = db::connect(config).await?;
    let store = SqliteChunkStore::for_index(pool.clone(), &bundle.meta);
    let retriever = bundle.retriever(&store);
    let params = config.retrieval.to_params();

    let mut evaluator = Evaluator::new(MatchOptions {
        k: args.k,
        page_offset: args.page_offset,
        page_tolerance: args.page_tolerance,
    });

    for case in &cases {
        let result = retriever
            .retrieve(&case.query, &params)
            .await
            .with_context(|| format!("retrieval failed for query {:?}", case.query))?;
        evaluator.record(case, &result);
    }
    pool.close().await;

    let report = evaluator.finish();
    write_report(&args.out, &report)?;
    print_summary(&report);

    if let Some(threshold) = args.fail_under {
        if report.fails_under(threshold) {
            println!(
                "FAIL: Recall@{} {:.3} < {:.3}",
                report.k,
                report.recall_at_k.unwrap_or(0.0),
                threshold
            );
            return Ok(false);
        }
    }
    Ok(true)
}

fn write_report(out: &Path, report: &EvalReport) -> Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(out, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("Failed to write report {}", out.display()))?;
    Ok(())
}

fn fmt_metric(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.3}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

fn print_summary(report: &EvalReport) {
    println!("retrieval eval");
    println!("  cases_total: {}", report.cases_total);
    println!("  cases_scored_gold: {}", report.cases_scored_gold);
    println!("  recall@{}: {}", report.k, fmt_metric(report.recall_at_k));
    println!("  mrr: {}", fmt_metric(report.mrr));
    println!("  no_evidence_total: {}", report.no_evidence_total);
    println!("  no_evidence_accuracy: {}", fmt_metric(report.no_evidence_accuracy));
    println!("  false_evidence_rate: {}", fmt_metric(report.false_evidence_rate));
}
