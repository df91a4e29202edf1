//! Text normalization applied to every extracted chunk.
//!
//! Each pass is a function `&str -> String` applied in sequence. The result is
//! a single line with no leading, trailing or repeated whitespace.

use std::sync::LazyLock;

use regex::Regex;
use slmforge_shared::RawChunk;

/// Normalize a chunk's content, dropping the chunk if nothing is left.
///
/// Lineage fields and metadata are carried over unchanged.
pub fn clean(mut chunk: RawChunk) -> Option<RawChunk> {
    let text = clean_text(&chunk.content);
    if text.is_empty() {
        tracing::trace!(id = %chunk.id, "dropped empty chunk");
        return None;
    }
    chunk.content = text;
    Some(chunk)
}

/// Run the full cleanup pipeline on raw text.
pub fn clean_text(text: &str) -> String {
    let mut result = normalize_line_endings(text);

    result = drop_blank_lines(&result);
    result = collapse_whitespace(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Line endings
// ---------------------------------------------------------------------------

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Trim lines, drop blank ones
// ---------------------------------------------------------------------------

fn drop_blank_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Collapse whitespace
// ---------------------------------------------------------------------------

/// Replace every run of whitespace or control characters (newlines included)
/// with one space.
fn collapse_whitespace(text: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[\s\p{Cc}]+").expect("valid regex"));

    WS_RE.replace_all(text, " ").trim().to_string()
}
