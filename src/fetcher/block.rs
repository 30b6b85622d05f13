//! Bot-block and challenge page detection, shared by every tier.

/// Phrases that only appear on challenge/interstitial pages (lower-case).
pub const CHALLENGE_PHRASES: &[&str] = &[
    "checking your browser",
    "just a moment",
    "enable javascript and cookies",
    "cf-browser-verification",
    "cf_chl_opt",
    "ray id",
    "attention required! | cloudflare",
    "ddos-guard",
    "sucuri website firewall",
    "please wait",
    "your ip address",
];

/// Default minimum length of a real page, in bytes
pub const DEFAULT_MIN_CONTENT_BYTES: usize = 3000;

#[derive(Debug, Clone, Copy)]
pub struct BlockClassifier {
    min_bytes: usize,
}

impl Default for BlockClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONTENT_BYTES)
    }
}

impl BlockClassifier {
    pub fn new(min_bytes: usize) -> Self {
        Self { min_bytes }
    }

    /// A body is a block page if it is shorter than the threshold or
    /// mentions any challenge phrase, regardless of case.
    pub fn is_blocked(&self, body: &str) -> bool {
        if body.len() < self.min_bytes {
            return true;
        }
        let lower = body.to_lowercase();
        CHALLENGE_PHRASES.iter().any(|phrase| lower.contains(phrase))
    }

    /// The first challenge phrase found, for logging
    pub fn matched_phrase(&self, body: &str) -> Option<&'static str> {
        let lower = body.to_lowercase();
        CHALLENGE_PHRASES
            .iter()
            .copied()
            .find(|phrase| lower.contains(phrase))
    }
}
