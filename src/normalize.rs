//! Title normalization for the explicit marker.
//!
//! A canonical title carries at most one marker token, and only at the front.
//! Every function here is pure and idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker token prefixed to explicit titles.
pub const MARKER: &str = "[E]";

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Leading marker with any surrounding whitespace: " [E]  Song"
pub static LEADING_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*\[E\]\s*").unwrap());

/// Trailing marker with any surrounding whitespace: "Song [E] "
pub static TRAILING_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*\[E\]\s*$").unwrap());

/// Marker anywhere in the string: "Song [e] (Live)"
pub static INLINE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[E\]").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Remove every marker token from a title, collapse whitespace runs and trim.
///
/// Inline removal repeats until no marker remains, so nested input such as
/// `"[[E]E]"` cannot leave a marker behind.
pub fn strip_marker(title: &str) -> String {
    if title.is_empty() {
        return String::new();
    }
    let mut s = LEADING_MARKER.replace(title, "").into_owned();
    s = TRAILING_MARKER.replace(&s, "").into_owned();
    while INLINE_MARKER.is_match(&s) {
        s = INLINE_MARKER.replace_all(&s, "").into_owned();
    }
    MULTI_SPACE.replace_all(&s, " ").trim().to_string()
}

/// True if the title carries a marker anywhere, any case.
pub fn has_marker(title: &str) -> bool {
    INLINE_MARKER.is_match(title)
}

/// Canonical explicit form: a single marker in front of the stripped title.
pub fn apply_front(title: &str) -> String {
    let base = strip_marker(title);
    if base.is_empty() {
        MARKER.to_string()
    } else {
        format!("{} {}", MARKER, base)
    }
}

/// Title an entry should carry given its explicitness verdict.
pub fn desired_title(title: &str, explicit: bool) -> String {
    if explicit {
        apply_front(title)
    } else {
        strip_marker(title)
    }
}

// ============================================================================
// TESTS
// ============================================================================
