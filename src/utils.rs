use itertools::Itertools;

/// Trims the text and collapses every run of whitespace into a single space.
///
/// # Arguments
///
/// * `text` - The text to normalize
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// Parses a row-position token such as `"42"`.
///
/// Only plain ASCII digits count: signs, separators and surrounding text make the token a
/// content key instead.
pub(crate) fn parse_position(token: &str) -> Option<usize> {
    let token = token.trim();
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
