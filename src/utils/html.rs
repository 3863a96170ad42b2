// src/utils/html.rs

/// Sanitizes instructor-provided rich text (course descriptions, material bodies).
///
/// Whitelist based: safe formatting tags survive, scripts and event handler
/// attributes are stripped.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

pub fn clean_optional(input: Option<String>) -> Option<String> {
    input.map(|s| clean_html(&s))
}
