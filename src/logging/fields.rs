//! Field helpers for structured call logs

use uuid::Uuid;

/// Truncate `text` to at most `max_chars` characters, appending `...` when
/// anything was cut. Never splits a UTF-8 sequence.
///
/// # Examples
///
/// ```
/// use meridian::logging::truncate_content;
///
/// assert_eq!(truncate_content("hello world", 5), "hello...");
/// assert_eq!(truncate_content("héllo", 10), "héllo");
/// ```
pub fn truncate_content(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Content preview for a log line, or `None` when content logging is off.
pub fn content_preview(text: &str, enabled: bool, max_chars: usize) -> Option<String> {
    enabled.then(|| truncate_content(text, max_chars))
}

/// Correlation id attached to every gateway call and its log lines.
pub fn generate_call_id() -> String {
    Uuid::new_v4().to_string()
}
