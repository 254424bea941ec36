//! Text processing utilities. Lengths and offsets are in characters.

/// Cut `text` to at most `max_chars` characters.
///
/// Returns the kept prefix and whether anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Single-line preview of `text` for terminal output.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let (head, cut) = truncate_chars(&flat, max_chars);
    if cut {
        format!("{}...", head.trim_end())
    } else {
        flat
    }
}
