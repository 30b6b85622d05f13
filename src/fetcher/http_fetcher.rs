use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use tracing::debug;

use crate::app::Result;
use crate::config::FetchConfig;
use crate::fetcher::{FetchTier, Tier, TierRequest, TierResponse};

pub(crate) const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Tier 1: a plain HTTP client with a realistic browser user agent
pub struct DirectTier {
    client: Client,
}

impl DirectTier {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.direct_timeout())
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .default_headers(base_headers())
            .build()?;

        Ok(Self { client })
    }
}

/// Headers every HTTP tier sends
pub(crate) fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

/// Per-request headers: Accept override plus caller-supplied extras
pub(crate) fn request_headers(request: &TierRequest<'_>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(accept) = request.accept {
        if let Ok(value) = HeaderValue::from_str(accept) {
            headers.insert(ACCEPT, value);
        }
    }

    for (name, value) in request.extra_headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }

    headers
}

#[async_trait]
impl FetchTier for DirectTier {
    fn tier(&self) -> Tier {
        Tier::Direct
    }

    async fn attempt(&self, url: &str, request: &TierRequest<'_>) -> Result<TierResponse> {
        let response = self
            .client
            .get(url)
            .headers(request_headers(request))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url, status, bytes = body.len(), "[direct] response");

        Ok(TierResponse { status, body })
    }
}
