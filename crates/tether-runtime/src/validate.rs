//! Pattern validation for `play_code`.
//!
//! A cheap syntactic screen run before a pattern is pushed to peers. It
//! catches empty input, unbalanced parentheses, text that does not look
//! like a pattern at all, and a handful of browser APIs that have no place
//! in one.

/// At least one of these must appear (case-insensitive substring).
const PATTERN_KEYWORDS: &[&str] = &["note", "sound", "s", "n", "stack", "cat", "seq"];

/// None of these may appear (case-insensitive substring).
const FORBIDDEN: &[&str] = &[
    "import",
    "require",
    "eval",
    "function",
    "window.",
    "document.",
    "fetch",
    "xhr",
];

/// Check `code` before it is pushed. `Err` carries a human-readable reason.
pub fn validate_pattern(code: &str) -> Result<(), String> {
    if code.trim().is_empty() {
        return Err("Code cannot be empty".to_string());
    }

    if code.matches('(').count() != code.matches(')').count() {
        return Err("Mismatched parentheses".to_string());
    }

    let lower = code.to_lowercase();
    if !PATTERN_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Err(format!(
            "Code doesn't appear to contain a pattern (missing {})",
            PATTERN_KEYWORDS.join("/")
        ));
    }

    let found: Vec<&str> = FORBIDDEN
        .iter()
        .copied()
        .filter(|d| lower.contains(d))
        .collect();
    if !found.is_empty() {
        return Err(format!(
            "Code contains potentially dangerous elements: {}",
            found.join(", ")
        ));
    }

    Ok(())
}
