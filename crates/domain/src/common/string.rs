//! String sanitizing utilities.

/// Longest visible label a dialog button may carry.
pub const MAX_LABEL_CHARS: usize = 48;

/// Converts an empty (or whitespace-only) string to `None`.
///
/// # Examples
///
/// ```
/// use rphud_domain::common::none_if_blank;
///
/// assert_eq!(none_if_blank("hello"), Some("hello"));
/// assert_eq!(none_if_blank(""), None);
/// assert_eq!(none_if_blank("  "), None);
/// ```
pub fn none_if_blank(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Keeps only `[A-Za-z0-9_-]` so an opaque token can never smuggle
/// control or quoting characters.
///
/// # Examples
///
/// ```
/// use rphud_domain::common::sanitize_token;
///
/// assert_eq!(sanitize_token(" abc-123\n"), "abc-123");
/// assert_eq!(sanitize_token("a'b;c"), "abc");
/// ```
pub fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Strips control characters, collapses runs of whitespace to one space,
/// trims, and truncates to `max_chars` characters.
pub fn collapse_whitespace(raw: &str, max_chars: usize) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    cleaned
        .split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}

/// Sanitized form of a dialog button label.
pub fn sanitize_label(raw: &str) -> String {
    collapse_whitespace(raw, MAX_LABEL_CHARS)
}
