use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, REFERER};
use reqwest::{Client, RequestBuilder};
use tracing::{debug, info, warn};
use url::Url;

use crate::app::Result;
use crate::config::FetchConfig;
use crate::fetcher::http_fetcher::{base_headers, request_headers};
use crate::fetcher::solver::{self, Solution, SubmitMethod};
use crate::fetcher::{BlockClassifier, FetchTier, Pacer, Tier, TierRequest, TierResponse};

/// Challenge rounds (script or refresh) followed per attempt
const MAX_CHALLENGE_ROUNDS: usize = 2;

static META_REFRESH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]*http-equiv\s*=\s*["']?refresh["']?[^>]*content\s*=\s*["']\s*(\d+)\s*(?:;\s*url\s*=\s*([^"'>]+))?"#,
    )
    .expect("valid meta refresh regex")
});

static REFRESH_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+)\s*(?:;\s*url\s*=\s*(\S+))?").expect("valid refresh header regex")
});

/// A continuation announced by a challenge page
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshDirective {
    pub delay: Duration,
    pub target: Option<String>,
}

/// One response of the challenge client
struct Exchange {
    status: u16,
    headers: HeaderMap,
    body: String,
    /// Final URL after redirects
    url: Url,
}

/// Tier 2: a cookie-keeping client for interstitials that clear themselves.
///
/// Script challenges that compute a form answer are solved with an embedded
/// JavaScript engine and the filled form is submitted. Pages that set a
/// clearance cookie and announce a refresh are waited out and re-requested
/// with the cookies they issued. Anything else falls through to the browser
/// tier.
pub struct ChallengeTier {
    client: Client,
    jar: Arc<Jar>,
    classifier: BlockClassifier,
    pacer: Pacer,
    max_wait: Duration,
}

impl ChallengeTier {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut headers = base_headers();
        headers.insert("upgrade-insecure-requests", HeaderValue::from_static("1"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
        headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(config.challenge_timeout())
            .connect_timeout(Duration::from_secs(10))
            .cookie_provider(jar.clone())
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            jar,
            classifier: BlockClassifier::new(config.min_content_bytes),
            pacer: Pacer::new(config),
            max_wait: config.challenge_max_wait(),
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Exchange> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.text().await?;
        debug!(url = %url, status, bytes = body.len(), "[challenge] response");
        Ok(Exchange {
            status,
            headers,
            body,
            url,
        })
    }

    /// Store the script's cookies, honor its timeout, then send the form
    async fn submit(&self, solution: &Solution, headers: HeaderMap) -> Result<Exchange> {
        for cookie in &solution.cookies {
            self.jar.add_cookie_str(cookie, &solution.action);
        }
        self.pacer.wait(solution.delay.min(self.max_wait)).await;

        let url = solution.submit_url();
        let request = match solution.method {
            SubmitMethod::Get => self.client.get(url.as_str()).headers(headers),
            SubmitMethod::Post => self
                .client
                .post(url.as_str())
                .headers(headers)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(solution.form_body()),
        };
        self.send(request).await
    }
}

/// Extract a refresh directive from the `Refresh` header or a meta tag
pub fn refresh_directive(headers: &HeaderMap, body: &str) -> Option<RefreshDirective> {
    let from_header = headers
        .get("refresh")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| REFRESH_HEADER.captures(v));
    let captures = from_header.or_else(|| META_REFRESH.captures(body))?;

    let delay = captures.get(1)?.as_str().parse::<u64>().ok()?;
    let target = captures
        .get(2)
        .map(|m| html_escape::decode_html_entities(m.as_str().trim()).to_string())
        .filter(|t| !t.is_empty());

    Some(RefreshDirective {
        delay: Duration::from_secs(delay),
        target,
    })
}

#[async_trait]
impl FetchTier for ChallengeTier {
    fn tier(&self) -> Tier {
        Tier::Challenge
    }

    async fn attempt(&self, url: &str, request: &TierRequest<'_>) -> Result<TierResponse> {
        let headers = request_headers(request);
        let mut exchange = self.send(self.client.get(url).headers(headers.clone())).await?;

        for round in 1..=MAX_CHALLENGE_ROUNDS {
            let status = exchange.status;
            if status != 200 && status != 503 && status != 403 {
                break;
            }
            if !self.classifier.is_blocked(&exchange.body) {
                break;
            }

            let mut retry_headers = headers.clone();
            if let Ok(referer) = HeaderValue::from_str(exchange.url.as_str()) {
                retry_headers.insert(REFERER, referer);
            }

            match solver::solve(&exchange.body, &exchange.url) {
                Ok(Some(solution)) => {
                    info!(
                        url,
                        round,
                        action = %solution.action,
                        "[challenge] submitting solved script challenge"
                    );
                    exchange = self.submit(&solution, retry_headers).await?;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(url, round, "[challenge] could not solve script challenge: {}", e);
                    break;
                }
            }

            let Some(directive) = refresh_directive(&exchange.headers, &exchange.body) else {
                break;
            };
            let next = match directive.target.as_deref() {
                Some(target) => exchange.url.join(target)?,
                None => exchange.url.clone(),
            };
            let wait = directive.delay.min(self.max_wait);
            info!(
                url,
                round,
                next = %next,
                "[challenge] waiting {:.0}s for interstitial",
                wait.as_secs_f64()
            );
            self.pacer.wait(wait).await;
            exchange = self
                .send(self.client.get(next.as_str()).headers(retry_headers))
                .await?;
        }

        Ok(TierResponse {
            status: exchange.status,
            body: exchange.body,
        })
    }
}
