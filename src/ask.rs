//! Answer assembly and the `ask` command.
//!
//! Answers are template-filled from the retrieved passages; no text is
//! generated. An abstention always produces the same fixed sentence so
//! that clients can tell it apart from an answer without parsing.

use anyhow::Result;
use docassist_core::models::ScoredChunk;
use docassist_core::trace::RetrievalTrace;
use docassist_core::RetrievalResult;
use serde::Serialize;

use crate::config::Config;
use crate::db;
use crate::index_store::IndexBundle;
use crate::sqlite_store::SqliteChunkStore;

pub const NO_EVIDENCE_ANSWER: &str =
    "I don't have enough evidence in the documents to answer this reliably.";

const ANSWER_HEADER: &str =
    "I found these relevant passages in your documents. Check the citations to verify:";

const EXCERPT_CHARS: usize = 350;
const CLI_PREVIEW_CHARS: usize = 220;

/// One cited passage as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub source: String,
    pub page: Option<i64>,
    pub chunk_id: i64,
    pub score: Option<f64>,
}

impl From<&ScoredChunk> for Citation {
    fn from(chunk: &ScoredChunk) -> Self {
        Self {
            source: chunk.location.source.clone(),
            page: chunk.location.page,
            chunk_id: chunk.chunk_id,
            score: chunk.score,
        }
    }
}

/// The client-facing answer to one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub abstained: bool,
    pub reason: Option<String>,
    pub debug: Option<RetrievalTrace>,
}

impl From<RetrievalResult> for Answer {
    fn from(result: RetrievalResult) -> Self {
        Self {
            answer: render_answer(&result),
            citations: result.chunks.iter().map(Citation::from).collect(),
            abstained: result.abstained,
            reason: result.reason.map(|r| r.as_str().to_string()),
            debug: result.trace,
        }
    }
}

pub fn render_answer(result: &RetrievalResult) -> String {
    if result.abstained || result.chunks.is_empty() {
        return NO_EVIDENCE_ANSWER.to_string();
    }
    let excerpts: Vec<String> = result
        .chunks
        .iter()
        .map(|c| format!("- {}", clip(&c.text, EXCERPT_CHARS)))
        .collect();
    format!("{}\n\n{}", ANSWER_HEADER, excerpts.join("\n"))
}

/// The first `max_chars` characters of `text`.
fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Run the `ask` command.
pub async fn run_ask(config: &Config, question: &str, trace: bool, json: bool) -> Result<()> {
    let bundle = IndexBundle::load(config)?;
    let pool = db::connect(config).await?;
    let store = SqliteChunkStore::for_index(pool.clone(), &bundle.meta);

    let mut params = config.retrieval.to_params();
    params.include_trace |= trace;

    let result = bundle.retriever(&store).retrieve(question, &params).await?;
    pool.close().await;

    if json {
        let answer = Answer::from(result);
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    if let Some(reason) = result.reason {
        println!("NO EVIDENCE ({})", reason);
    } else {
        for (i, chunk) in result.chunks.iter().enumerate() {
            let score = chunk
                .score
                .map(|s| format!("{:.4}", s))
                .unwrap_or_else(|| "n/a".to_string());
            let page = chunk
                .location
                .page
                .map(|p| format!("p.{}", p))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "#{} score={} {} {} chunk={}",
                i + 1,
                score,
                chunk.location.source,
                page,
                chunk.chunk_id
            );
            println!("    {}", clip(&chunk.text, CLI_PREVIEW_CHARS));
        }
    }

    if let Some(trace) = &result.trace {
        println!();
        println!("trace:");
        println!("{}", serde_json::to_string_pretty(trace)?);
    }

    Ok(())
}
