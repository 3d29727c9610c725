//! Extraction of the book JSON from raw model output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// First ```json fenced block, tag matched case-insensitively, body may span lines.
static JSON_FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)```json(.*?)```").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("model output is not valid JSON")]
    Malformed,
    #[error("model output lacks a book title or scenes")]
    InvalidShape,
}

/// Parse the model's text into a book object.
///
/// Only the interior of the first fenced JSON block is used when one is
/// present.  The parsed value is returned as-is once it has a non-empty
/// `bookTitle` string and a non-empty `scenes` array; nothing else about
/// the content is checked.
pub fn extract(raw: &str) -> Result<Value, ExtractionError> {
    let candidate = JSON_FENCE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let parsed: Value =
        serde_json::from_str(candidate.trim()).map_err(|_| ExtractionError::Malformed)?;

    if has_book_shape(&parsed) {
        Ok(parsed)
    } else {
        Err(ExtractionError::InvalidShape)
    }
}

fn has_book_shape(value: &Value) -> bool {
    let title_ok = value
        .get("bookTitle")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.is_empty());
    let scenes_ok = value
        .get("scenes")
        .and_then(Value::as_array)
        .is_some_and(|s| !s.is_empty());
    title_ok && scenes_ok
}

/// Number of entries in `scenes`, for diagnostics on an extracted book.
pub fn scene_count(book: &Value) -> usize {
    book.get("scenes")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}
