//! Text preparation before classification.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// `[.]` and `(dot)` stand-ins for a dot
static DOT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[\.\]|\(dot\)").expect("Invalid dot regex"));

/// `hxxp` / `hxxps` defanged schemes
static SCHEME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)hxxps?").expect("Invalid scheme regex"));

/// Rewrites common URL obfuscations back to their canonical form.
pub fn normalize_text(text: &str) -> Cow<'_, str> {
    let dots = DOT_RE.replace_all(text, ".");
    if !SCHEME_RE.is_match(&dots) {
        return dots;
    }
    Cow::Owned(SCHEME_RE.replace_all(&dots, "https").into_owned())
}

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
