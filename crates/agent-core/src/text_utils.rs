//! Shared text utility functions.

/// First `max_chars` code points of `s`, with `...` appended when something was cut.
///
/// Cuts on char boundaries, so multi-byte text never splits mid code point.
pub fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}
