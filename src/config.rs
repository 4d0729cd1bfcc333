//! TOML configuration.
//!
//! Every section except `[db]` and `[index]` is optional and falls back to
//! the defaults below. [`load_config`] parses and validates in one step so
//! that commands never see an inconsistent configuration.

use anyhow::{Context, Result};
use docassist_core::RetrievalParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding `index.bin` and `meta.json`.
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_candidates_k")]
    pub search_candidates_k: usize,
    #[serde(default = "default_max_citations")]
    pub max_citations: usize,
    #[serde(default = "default_min_top_score")]
    pub min_top_score: f64,
    #[serde(default = "default_min_top_score_margin")]
    pub min_top_score_margin: f64,
    #[serde(default = "default_min_score_gap")]
    pub min_score_gap: f64,
    #[serde(default = "default_min_row_score")]
    pub min_row_score: f64,
    /// Attach the retrieval trace to every answer.
    #[serde(default)]
    pub include_trace: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_candidates_k: default_search_candidates_k(),
            max_citations: default_max_citations(),
            min_top_score: default_min_top_score(),
            min_top_score_margin: default_min_top_score_margin(),
            min_score_gap: default_min_score_gap(),
            min_row_score: default_min_row_score(),
            include_trace: false,
        }
    }
}

fn default_search_candidates_k() -> usize {
    15
}
fn default_max_citations() -> usize {
    5
}
fn default_min_top_score() -> f64 {
    0.80
}
fn default_min_top_score_margin() -> f64 {
    0.05
}
fn default_min_score_gap() -> f64 {
    0.02
}
fn default_min_row_score() -> f64 {
    0.30
}

impl RetrievalConfig {
    pub fn to_params(&self) -> RetrievalParams {
        RetrievalParams {
            search_candidates_k: self.search_candidates_k,
            max_citations: self.max_citations,
            min_top_score: self.min_top_score,
            min_top_score_margin: self.min_top_score_margin,
            min_score_gap: self.min_score_gap,
            min_row_score: self.min_row_score,
            include_trace: self.include_trace,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. `info` or `docassist=debug,sqlx=warn`.
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        anyhow::bail!("chunking.overlap_chars must be smaller than chunking.chunk_chars");
    }

    // Validate retrieval
    config
        .retrieval
        .to_params()
        .validate()
        .map_err(|e| anyhow::anyhow!("retrieval: {}", e))?;

    // Validate embedding
    let embedding = &config.embedding;
    if embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match embedding.provider.as_str() {
        "disabled" | "local" => {}
        "hash" => {
            if embedding.dims.unwrap_or(0) == 0 {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'hash'");
            }
        }
        "openai" | "ollama" => {
            if embedding.dims.unwrap_or(0) == 0 {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hash, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
