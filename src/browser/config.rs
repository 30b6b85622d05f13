use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the browser fetch tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Allow escalation to a real browser (default: true)
    pub enabled: bool,

    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// Page navigation timeout in seconds (default: 45)
    pub timeout_secs: u64,

    /// Wait time after page load for dynamic content in milliseconds (default: 3000)
    pub wait_after_load_ms: u64,

    /// Extra wait when a challenge page is still showing after load, in seconds (default: 15)
    pub challenge_wait_secs: u64,

    /// Languages reported by `navigator.languages`
    pub languages: Vec<String>,

    /// Viewport width and height
    pub window_size: (u32, u32),

    /// User agent override; the fetch user agent is used when unset
    pub user_agent: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            timeout_secs: 45,
            wait_after_load_ms: 3000,
            challenge_wait_secs: 15,
            languages: vec!["en-US".to_string(), "en".to_string()],
            window_size: (1920, 1080),
            user_agent: None,
        }
    }
}

impl BrowserConfig {
    /// Get the navigation timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get the wait time after load as a Duration
    pub fn wait_after_load(&self) -> Duration {
        Duration::from_millis(self.wait_after_load_ms)
    }

    /// Get the challenge wait as a Duration
    pub fn challenge_wait(&self) -> Duration {
        Duration::from_secs(self.challenge_wait_secs)
    }
}
