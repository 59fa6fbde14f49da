//! Token estimates for backends that do not report usage.
//!
//! Counts are approximations from character length, tuned per model family.
//! They only feed cost accounting and input truncation.

use openai_client::truncate_to_char_boundary;

/// Average characters per token for a model family.
fn chars_per_token(model: &str) -> f64 {
    let model = model.to_ascii_lowercase();
    if model.contains("gpt-4o") || model.contains("o1") || model.contains("o3") {
        4.0
    } else if model.contains("gemini") {
        4.2
    } else if model.contains("llama") {
        3.6
    } else {
        4.0
    }
}

/// Estimate the token count of `text` for `model`.
pub fn estimate_tokens(text: &str, model: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    (chars / chars_per_token(model)).ceil() as u64
}

/// Cut `text` so its estimate stays within `max_tokens`.
///
/// Returns the input unchanged when it already fits.
pub fn truncate_to_tokens<'a>(text: &'a str, model: &str, max_tokens: usize) -> &'a str {
    if estimate_tokens(text, model) <= max_tokens as u64 {
        return text;
    }
    let max_chars = (max_tokens as f64 * chars_per_token(model)).floor() as usize;
    let byte_limit = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    truncate_to_char_boundary(text, byte_limit)
}
