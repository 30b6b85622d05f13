use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::fetcher::Tier;

/// Browser-like user agent shared by the HTTP tiers and the browser tier
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Configuration for the fetch tier ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Lower bound of the randomized delay before each live request, in seconds (default: 1.5)
    pub delay_min_secs: f64,

    /// Upper bound of the randomized delay before each live request, in seconds (default: 3.0)
    pub delay_max_secs: f64,

    /// How long a cached response stays fresh, in seconds (default: 6 hours)
    pub cache_ttl_secs: u64,

    /// Skip the on-disk response cache entirely (default: false)
    pub no_cache: bool,

    /// Timeout for a direct request, in seconds (default: 25)
    pub direct_timeout_secs: u64,

    /// Timeout for a challenge-client request, in seconds (default: 35)
    pub challenge_timeout_secs: u64,

    /// Longest delay the challenge client honors from a refresh directive, in seconds (default: 10)
    pub challenge_max_wait_secs: u64,

    /// Per-tier attempt counts
    pub retries: RetryConfig,

    /// Sleep after an HTTP 429 before retrying, in seconds (default: 30)
    pub rate_limit_backoff_secs: u64,

    /// Base of the exponential backoff between failed attempts, in milliseconds (default: 1000)
    pub backoff_base_ms: u64,

    /// Responses shorter than this are treated as block pages (default: 3000)
    pub min_content_bytes: usize,

    /// User agent sent by every tier
    pub user_agent: String,
}

/// Attempt counts per tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub direct: u32,
    pub challenge: u32,
    pub browser: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            direct: 3,
            challenge: 3,
            browser: 1,
        }
    }
}

impl RetryConfig {
    pub fn for_tier(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Direct => self.direct,
            Tier::Challenge => self.challenge,
            Tier::Browser => self.browser,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            delay_min_secs: 1.5,
            delay_max_secs: 3.0,
            cache_ttl_secs: 6 * 3600,
            no_cache: false,
            direct_timeout_secs: 25,
            challenge_timeout_secs: 35,
            challenge_max_wait_secs: 10,
            retries: RetryConfig::default(),
            rate_limit_backoff_secs: 30,
            backoff_base_ms: 1000,
            min_content_bytes: 3000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn direct_timeout(&self) -> Duration {
        Duration::from_secs(self.direct_timeout_secs)
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_secs(self.challenge_timeout_secs)
    }

    pub fn challenge_max_wait(&self) -> Duration {
        Duration::from_secs(self.challenge_max_wait_secs)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// A config with every sleep disabled, for tests and dry runs
    pub fn immediate() -> Self {
        Self {
            delay_min_secs: 0.0,
            delay_max_secs: 0.0,
            rate_limit_backoff_secs: 0,
            backoff_base_ms: 0,
            challenge_max_wait_secs: 0,
            ..Default::default()
        }
    }
}
