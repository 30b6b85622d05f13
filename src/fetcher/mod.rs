//! Tiered fetching.
//!
//! A [`FetchLadder`] walks an ordered list of [`FetchTier`]s, from a plain
//! HTTP request up to a real browser, until one of them returns content that
//! is not a bot-block page. The challenge tier runs simple script challenges
//! itself (see [`solver`]).
//!
//! ```text
//! cache → Direct → Challenge → Browser
//!            └── block / exhausted ──┘ escalate
//! ```

pub mod block;
pub mod cache;
pub mod challenge;
pub mod debug;
pub mod http_fetcher;
pub mod ladder;
pub mod pacer;
pub mod solver;

pub use block::BlockClassifier;
pub use cache::ResponseCache;
pub use challenge::ChallengeTier;
pub use debug::DebugArtifacts;
pub use http_fetcher::DirectTier;
pub use ladder::FetchLadder;
pub use pacer::Pacer;

use std::fmt;

use async_trait::async_trait;

use crate::app::Result;

/// Fetch strategies in ascending cost/capability order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Direct,
    Challenge,
    Browser,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Challenge => "challenge",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request knobs a tier needs
#[derive(Debug, Clone, Copy, Default)]
pub struct TierRequest<'a> {
    pub accept: Option<&'a str>,
    pub extra_headers: &'a [(String, String)],
}

/// Raw response of a single attempt
#[derive(Debug, Clone)]
pub struct TierResponse {
    pub status: u16,
    pub body: String,
}

impl TierResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// One rung of the ladder.
///
/// `attempt` performs exactly one request; retries, classification and
/// escalation belong to the ladder.
#[async_trait]
pub trait FetchTier: Send + Sync {
    fn tier(&self) -> Tier;

    async fn attempt(&self, url: &str, request: &TierRequest<'_>) -> Result<TierResponse>;

    /// Release any resources held by the tier
    async fn shutdown(&self) {}
}

/// Options for a single ladder fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Read from and write to the on-disk cache
    pub use_cache: bool,
    /// First tier to try
    pub start_tier: Tier,
    /// Last tier to escalate to
    pub max_tier: Tier,
    /// Attempt count for every tier, overriding the configured per-tier counts
    pub retries: Option<u32>,
    /// Classify 200 responses with the block classifier
    pub detect_blocks: bool,
    /// Accept header override
    pub accept: Option<String>,
    /// Additional request headers (e.g. Referer)
    pub extra_headers: Vec<(String, String)>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::html()
    }
}

impl FetchOptions {
    /// Full ladder, cached, block detection on
    pub fn html() -> Self {
        Self {
            use_cache: true,
            start_tier: Tier::Direct,
            max_tier: Tier::Browser,
            retries: None,
            detect_blocks: true,
            accept: None,
            extra_headers: Vec::new(),
        }
    }

    /// For sites known to sit behind a challenge: skip the direct tier
    pub fn hard() -> Self {
        Self {
            start_tier: Tier::Challenge,
            ..Self::html()
        }
    }

    /// Straight to the browser
    pub fn browser_only() -> Self {
        Self {
            start_tier: Tier::Browser,
            ..Self::html()
        }
    }

    /// JSON APIs: direct tier only, uncached, no block detection
    pub fn json() -> Self {
        Self {
            use_cache: false,
            start_tier: Tier::Direct,
            max_tier: Tier::Direct,
            retries: None,
            detect_blocks: false,
            accept: Some("application/json".to_string()),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.extra_headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    fn request(&self) -> TierRequest<'_> {
        TierRequest {
            accept: self.accept.as_deref(),
            extra_headers: &self.extra_headers,
        }
    }
}

/// Result of a ladder fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched {
        content: String,
        tier: Option<Tier>,
        from_cache: bool,
    },
    /// HTTP 404: the entity is genuinely absent
    NotFound,
    /// Every tier failed or was blocked; try again on a later run
    Unavailable,
}

impl FetchOutcome {
    pub fn into_content(self) -> Option<String> {
        match self {
            Self::Fetched { content, .. } => Some(content),
            Self::NotFound | Self::Unavailable => None,
        }
    }
}
