//! Page-level text extraction for the supported document formats.
//!
//! Markdown and plain text come back as a single unpaginated page. PDFs come
//! back one entry per PDF page, numbered from 1. Extraction never panics:
//! failures are returned and the ingest pipeline skips the file.

use std::path::Path;

use thiserror::Error;

/// A supported input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    Markdown,
    Text,
    Pdf,
}

impl DocType {
    /// Detect from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" => Some(Self::Markdown),
            "txt" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// The value stored in `documents.doc_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Text => "txt",
            Self::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Text of one page. `page` is `None` for unpaginated formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page: Option<i64>,
    pub text: String,
}

pub fn extract_pages(bytes: &[u8], doc_type: DocType) -> Result<Vec<PageText>, ExtractError> {
    match doc_type {
        DocType::Markdown | DocType::Text => Ok(vec![PageText {
            page: None,
            text: String::from_utf8_lossy(bytes).into_owned(),
        }]),
        DocType::Pdf => extract_pdf(bytes),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<PageText>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText {
            page: Some(i as i64 + 1),
            text,
        })
        .collect())
}
