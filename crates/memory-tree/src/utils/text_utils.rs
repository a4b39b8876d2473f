//! Character-safe text helpers

use std::borrow::Cow;

/// Length and truncation in Unicode scalar values, never bytes
pub struct TextUtils;

impl TextUtils {
    /// Number of characters in `text`
    pub fn char_len(text: &str) -> usize {
        text.chars().count()
    }

    /// Keep at most `max_chars` characters. Borrows when nothing is cut.
    pub fn truncate_chars(text: &str, max_chars: usize) -> Cow<'_, str> {
        match text.char_indices().nth(max_chars) {
            Some((byte_pos, _)) => Cow::Owned(text[..byte_pos].to_string()),
            None => Cow::Borrowed(text),
        }
    }

    /// The `Q:`/`A:` rendering of a prompt/response pair
    pub fn qa_block(prompt: &str, response: &str) -> String {
        format!("Q: {}\nA: {}", prompt, response)
    }
}
