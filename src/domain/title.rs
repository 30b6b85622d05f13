//! Placeholder title classification.
//!
//! Parsers sometimes capture the `<title>` of a challenge, error or welcome
//! interstitial instead of the real content title. Those strings are
//! collected here so the merge engine and the commit guard agree on what
//! counts as a placeholder.

/// Titles of known block, error and interstitial pages, already normalized
/// (trimmed and lower-cased).
pub const PLACEHOLDER_TITLES: &[&str] = &[
    "",
    "welcome",
    "welcome!",
    "access denied",
    "just a moment",
    "just a moment...",
    "403",
    "403 forbidden",
    "forbidden",
    "404",
    "404 not found",
    "not found",
    "page not found",
    "503",
    "service unavailable",
    "error",
    "attention required",
    "attention required! | cloudflare",
    "cloudflare",
    "checking your browser",
    "ddos-guard",
    "ray id",
    "untitled",
];

/// Minimum length (in characters, after trimming) of a real title.
pub const MIN_TITLE_CHARS: usize = 2;

/// Returns true if `title` is empty, too short, or the title of a known
/// block/error page.
pub fn is_placeholder_title(title: &str) -> bool {
    let normalized = title.trim().to_lowercase();
    normalized.chars().count() < MIN_TITLE_CHARS || PLACEHOLDER_TITLES.contains(&normalized.as_str())
}
