//! Character-budget helpers.
//!
//! All limits count `char`s, never bytes, so a cut never lands inside a
//! multi-byte UTF-8 sequence.

/// Appended to output that was cut short.
pub const TRUNCATION_MARKER: &str = "\n... (output truncated)";

/// Returns at most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Like [`truncate_chars`], but marks the result with [`TRUNCATION_MARKER`]
/// when anything was dropped.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    let kept = truncate_chars(text, max_chars);
    if kept.len() == text.len() {
        text.to_string()
    } else {
        format!("{kept}{TRUNCATION_MARKER}")
    }
}
