use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::config::FetchConfig;

/// Randomized politeness delays and retry backoff.
#[derive(Debug, Clone)]
pub struct Pacer {
    delay_min: Duration,
    delay_max: Duration,
    backoff_base: Duration,
    rate_limit_backoff: Duration,
}

impl Pacer {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            delay_min: secs(config.delay_min_secs),
            delay_max: secs(config.delay_max_secs),
            backoff_base: config.backoff_base(),
            rate_limit_backoff: config.rate_limit_backoff(),
        }
    }

    /// A pacer that never sleeps
    pub fn immediate() -> Self {
        Self::new(&FetchConfig::immediate())
    }

    /// Delay before a live request
    pub fn politeness_delay(&self) -> Duration {
        jitter(self.delay_min, self.delay_max)
    }

    /// Delay after failed attempt `attempt` (1-based): `base * 2^attempt` plus
    /// up to `2 * base` of jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base.saturating_mul(2u32.saturating_pow(attempt.min(16)));
        exp + jitter(Duration::ZERO, self.backoff_base.saturating_mul(2))
    }

    /// Delay after an HTTP 429
    pub fn rate_limit_delay(&self) -> Duration {
        if self.rate_limit_backoff.is_zero() {
            return Duration::ZERO;
        }
        self.rate_limit_backoff + jitter(Duration::from_secs(10), Duration::from_secs(20))
    }

    pub async fn politeness(&self) {
        sleep_logged(self.politeness_delay(), "politeness").await;
    }

    pub async fn backoff(&self, attempt: u32) {
        sleep_logged(self.backoff_delay(attempt), "backoff").await;
    }

    pub async fn rate_limited(&self) {
        sleep_logged(self.rate_limit_delay(), "rate limit").await;
    }

    /// Sleep for an explicit duration (e.g. a server-announced refresh)
    pub async fn wait(&self, duration: Duration) {
        sleep_logged(duration, "wait").await;
    }
}

/// Negative, non-finite and overflowing values become zero
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let secs = rand::thread_rng().gen_range(min.as_secs_f64()..max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

async fn sleep_logged(duration: Duration, reason: &str) {
    if duration.is_zero() {
        return;
    }
    debug!("Sleeping {:.1}s ({})", duration.as_secs_f64(), reason);
    tokio::time::sleep(duration).await;
}
