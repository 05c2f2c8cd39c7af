use crate::{TRUNCATION_MARKER, truncate_chars, truncate_with_marker};

#[test]
fn given_short_text_when_truncated_then_unchanged() {
    assert_eq!(truncate_chars("bpy.ops", 200), "bpy.ops");
    assert_eq!(truncate_with_marker("bpy.ops", 200), "bpy.ops");
}

#[test]
fn given_long_text_when_truncated_then_cut_at_char_limit() {
    // GIVEN: Text longer than the limit
    let text = "abcdefghij";

    // WHEN/THEN: Only the first N chars survive
    assert_eq!(truncate_chars(text, 4), "abcd");
    assert_eq!(
        truncate_with_marker(text, 4),
        format!("abcd{TRUNCATION_MARKER}")
    );
}

/// **VALUE**: Verifies that truncation never splits a multi-byte character.
///
/// **BUG THIS CATCHES**: Would catch byte slicing (`&text[..n]`), which panics on
/// non-ASCII output such as object names containing accents or arrows.
#[test]
fn given_multibyte_text_when_truncated_then_cut_on_char_boundary() {
    // GIVEN: Text with multi-byte characters
    let text = "→✓✗é";

    // WHEN: Truncating to 2 chars
    let kept = truncate_chars(text, 2);

    // THEN: Two whole characters are kept
    assert_eq!(kept, "→✓");
}
