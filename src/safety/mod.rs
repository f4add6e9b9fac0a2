//! Input validation and output bounding.

mod validator;

pub use validator::{ValidationResult, Validator};

/// Truncate `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!(
            "{}... [truncated, {} characters total]",
            &text[..cut],
            text.chars().count()
        ),
    }
}
