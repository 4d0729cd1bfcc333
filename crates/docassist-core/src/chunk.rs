//! Sliding-window page chunker.
//!
//! Splits the text of one page (or one unpaginated file) into overlapping
//! fixed-width windows. Offsets are character offsets into the
//! whitespace-normalized text, not byte offsets into the source file.
//!
//! # Algorithm
//!
//! 1. Collapse every run of whitespace to a single space and trim.
//! 2. Take a window of `chunk_chars` characters starting at `start`.
//! 3. Emit it unless it is blank after trimming.
//! 4. Stop at the end of the text, otherwise move `start` to
//!    `end - overlap_chars` and repeat.
//!
//! # Example
//!
//! ```rust
//! use docassist_core::chunk::chunk_page;
//!
//! let chunks = chunk_page(Some(2), "alpha   beta\n\ngamma", 1000, 150);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "alpha beta gamma");
//! assert_eq!(chunks[0].page, Some(2));
//! ```

/// One window of page text, ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChunk {
    pub page: Option<i64>,
    /// Character offset of the window start in the normalized text.
    pub char_start: usize,
    /// Character offset one past the window end.
    pub char_end: usize,
    pub text: String,
}

/// Collapse whitespace runs to single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split one page of text into overlapping windows.
///
/// Returns an empty list for blank input. An `overlap_chars` that is not
/// smaller than `chunk_chars` is treated as `chunk_chars - 1` so the window
/// always advances.
pub fn chunk_page(
    page: Option<i64>,
    text: &str,
    chunk_chars: usize,
    overlap_chars: usize,
) -> Vec<PageChunk> {
    let cleaned: Vec<char> = normalize_whitespace(text).chars().collect();
    if cleaned.is_empty() || chunk_chars == 0 {
        return Vec::new();
    }
    let overlap = overlap_chars.min(chunk_chars - 1);

    let n = cleaned.len();
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_chars).min(n);
        let window: String = cleaned[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(PageChunk {
                page,
                char_start: start,
                char_end: end,
                text: trimmed.to_string(),
            });
        }
        if end == n {
            break;
        }
        start = end - overlap;
    }
    chunks
}
