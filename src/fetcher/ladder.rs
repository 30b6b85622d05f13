use tracing::{debug, info, warn};

use crate::app::Result;
use crate::browser::BrowserTier;
use crate::config::{Config, RetryConfig};
use crate::fetcher::{
    BlockClassifier, ChallengeTier, DebugArtifacts, DirectTier, FetchOptions, FetchOutcome,
    FetchTier, Pacer, ResponseCache, Tier,
};

/// Characters of the URL used as the debug slug when none is given
const FALLBACK_SLUG_CHARS: usize = 40;

/// The escalating fetch strategy shared by every site adapter.
pub struct FetchLadder {
    tiers: Vec<Box<dyn FetchTier>>,
    cache: ResponseCache,
    debug: DebugArtifacts,
    classifier: BlockClassifier,
    pacer: Pacer,
    retries: RetryConfig,
}

/// What a tier's attempts ended with
enum TierResult {
    Content(String),
    NotFound,
    Escalate,
}

impl FetchLadder {
    pub fn new(
        tiers: Vec<Box<dyn FetchTier>>,
        cache: ResponseCache,
        debug: DebugArtifacts,
        classifier: BlockClassifier,
        pacer: Pacer,
        retries: RetryConfig,
    ) -> Self {
        let mut tiers = tiers;
        tiers.sort_by_key(|t| t.tier());
        Self {
            tiers,
            cache,
            debug,
            classifier,
            pacer,
            retries,
        }
    }

    /// Build the standard direct → challenge → browser ladder from config
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetch = &config.fetch;
        let mut tiers: Vec<Box<dyn FetchTier>> = vec![
            Box::new(DirectTier::new(fetch)?),
            Box::new(ChallengeTier::new(fetch)?),
        ];
        if config.browser.enabled {
            tiers.push(Box::new(BrowserTier::new(
                config.browser.clone(),
                fetch,
                config.paths.browser_state.clone(),
            )));
        }

        let cache = if fetch.no_cache {
            ResponseCache::disabled()
        } else {
            ResponseCache::new(&config.paths.cache_dir, fetch.cache_ttl())
        };

        Ok(Self::new(
            tiers,
            cache,
            DebugArtifacts::new(&config.paths.debug_dir),
            BlockClassifier::new(fetch.min_content_bytes),
            Pacer::new(fetch),
            fetch.retries.clone(),
        ))
    }

    pub fn debug_artifacts(&self) -> &DebugArtifacts {
        &self.debug
    }

    /// Fetch `url`, returning `None` when it is absent or temporarily unavailable
    pub async fn fetch(
        &self,
        url: &str,
        site: &str,
        slug: &str,
        options: &FetchOptions,
    ) -> Option<String> {
        self.fetch_outcome(url, site, slug, options)
            .await
            .into_content()
    }

    /// Fetch and decode a JSON document
    pub async fn fetch_json(
        &self,
        url: &str,
        site: &str,
        slug: &str,
        options: &FetchOptions,
    ) -> Option<serde_json::Value> {
        let body = self.fetch(url, site, slug, options).await?;
        match serde_json::from_str(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(url, site, "Response is not valid JSON: {}", e);
                None
            }
        }
    }

    pub async fn fetch_outcome(
        &self,
        url: &str,
        site: &str,
        slug: &str,
        options: &FetchOptions,
    ) -> FetchOutcome {
        let slug = if slug.is_empty() {
            fallback_slug(url)
        } else {
            slug.to_string()
        };
        let use_cache = options.use_cache && self.cache.is_enabled();

        if use_cache {
            if let Some(content) = self.cache.get(url) {
                if !options.detect_blocks || !self.classifier.is_blocked(&content) {
                    debug!(url, site, "Cache hit");
                    return FetchOutcome::Fetched {
                        content,
                        tier: None,
                        from_cache: true,
                    };
                }
                debug!(url, site, "Ignoring cached block page");
            }
        }

        let eligible: Vec<&dyn FetchTier> = self
            .tiers
            .iter()
            .map(|t| t.as_ref())
            .filter(|t| t.tier() >= options.start_tier && t.tier() <= options.max_tier)
            .collect();

        for (index, tier) in eligible.iter().enumerate() {
            let name = tier.tier();
            match self.run_tier(*tier, url, site, &slug, options).await {
                TierResult::Content(content) => {
                    if use_cache {
                        self.cache.put(url, &content);
                    }
                    return FetchOutcome::Fetched {
                        content,
                        tier: Some(name),
                        from_cache: false,
                    };
                }
                TierResult::NotFound => return FetchOutcome::NotFound,
                TierResult::Escalate => {
                    if let Some(next) = eligible.get(index + 1) {
                        info!(url, site, from = %name, to = %next.tier(), "Escalating");
                    }
                }
            }
        }

        warn!(url, site, "All tiers failed");
        FetchOutcome::Unavailable
    }

    async fn run_tier(
        &self,
        tier: &dyn FetchTier,
        url: &str,
        site: &str,
        slug: &str,
        options: &FetchOptions,
    ) -> TierResult {
        let name = tier.tier();
        let attempts = options
            .retries
            .unwrap_or_else(|| self.retries.for_tier(name))
            .max(1);
        let request = options.request();
        let mut last_body: Option<String> = None;

        for attempt in 1..=attempts {
            self.pacer.politeness().await;
            debug!(url, site, tier = %name, attempt, "GET");

            match tier.attempt(url, &request).await {
                Ok(response) => match response.status {
                    200 => {
                        if options.detect_blocks && self.classifier.is_blocked(&response.body) {
                            warn!(
                                url,
                                site,
                                tier = %name,
                                attempt,
                                bytes = response.body.len(),
                                phrase = self.classifier.matched_phrase(&response.body),
                                "Block page detected"
                            );
                            self.debug.save(site, slug, &response.body);
                            return TierResult::Escalate;
                        }
                        if response.body.trim().is_empty() {
                            warn!(url, site, tier = %name, attempt, "Empty response body");
                        } else {
                            return TierResult::Content(response.body);
                        }
                    }
                    404 => {
                        info!(url, site, tier = %name, "Not found");
                        return TierResult::NotFound;
                    }
                    429 => {
                        warn!(url, site, tier = %name, attempt, "Rate limited (429)");
                        self.pacer.rate_limited().await;
                        continue;
                    }
                    status => {
                        warn!(url, site, tier = %name, attempt, status, "Unexpected HTTP status");
                        last_body = Some(response.body);
                    }
                },
                Err(e) => {
                    warn!(url, site, tier = %name, attempt, "Request failed: {}", e);
                }
            }

            if attempt < attempts {
                self.pacer.backoff(attempt).await;
            }
        }

        if let Some(body) = last_body {
            self.debug.save(site, slug, &body);
        }
        TierResult::Escalate
    }

    /// Tear down every tier (closes the browser if one was started)
    pub async fn shutdown(&self) {
        for tier in &self.tiers {
            tier.shutdown().await;
        }
    }
}

fn fallback_slug(url: &str) -> String {
    let chars: Vec<char> = url.chars().collect();
    let start = chars.len().saturating_sub(FALLBACK_SLUG_CHARS);
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AlbumdexError;
    use crate::fetcher::{TierRequest, TierResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// A tier that replays scripted responses and counts calls
    struct ScriptedTier {
        tier: Tier,
        script: Mutex<VecDeque<std::result::Result<TierResponse, String>>>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedTier {
        fn boxed(
            tier: Tier,
            script: Vec<std::result::Result<TierResponse, String>>,
        ) -> (Box<dyn FetchTier>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let tier = Self {
                tier,
                script: Mutex::new(script.into()),
                calls: calls.clone(),
            };
            (Box::new(tier), calls)
        }
    }

    #[async_trait]
    impl FetchTier for ScriptedTier {
        fn tier(&self) -> Tier {
            self.tier
        }

        async fn attempt(&self, _url: &str, _request: &TierRequest<'_>) -> Result<TierResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(AlbumdexError::Other(message)),
                None => Err(AlbumdexError::Other("script exhausted".into())),
            }
        }
    }

    fn good_page() -> String {
        format!("<html><body>{}</body></html>", "gallery ".repeat(500))
    }

    fn ok(body: &str) -> std::result::Result<TierResponse, String> {
        Ok(TierResponse::new(200, body))
    }

    fn status(code: u16) -> std::result::Result<TierResponse, String> {
        Ok(TierResponse::new(code, "x"))
    }

    fn ladder(tiers: Vec<Box<dyn FetchTier>>, dir: &std::path::Path) -> FetchLadder {
        FetchLadder::new(
            tiers,
            ResponseCache::new(dir.join("cache"), std::time::Duration::from_secs(3600)),
            DebugArtifacts::new(dir.join("debug")),
            BlockClassifier::default(),
            Pacer::immediate(),
            RetryConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_direct_success_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let page = good_page();
        let (direct, direct_calls) = ScriptedTier::boxed(Tier::Direct, vec![ok(&page)]);
        let ladder = ladder(vec![direct], dir.path());

        let outcome = ladder
            .fetch_outcome("https://a.test/1", "site", "one", &FetchOptions::html())
            .await;
        assert_eq!(
            outcome,
            FetchOutcome::Fetched {
                content: page.clone(),
                tier: Some(Tier::Direct),
                from_cache: false
            }
        );

        // Second call is served from the cache without touching the tier
        let again = ladder
            .fetch_outcome("https://a.test/1", "site", "one", &FetchOptions::html())
            .await;
        assert!(matches!(again, FetchOutcome::Fetched { from_cache: true, .. }));
        assert_eq!(direct_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_block_escalates_and_saves_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let page = good_page();
        let (direct, direct_calls) = ScriptedTier::boxed(
            Tier::Direct,
            vec![ok("<html>Just a moment...</html>"), ok(&page)],
        );
        let (challenge, challenge_calls) = ScriptedTier::boxed(Tier::Challenge, vec![ok(&page)]);
        let ladder = ladder(vec![challenge, direct], dir.path());

        let outcome = ladder
            .fetch_outcome("https://a.test/2", "erome", "album_2", &FetchOptions::html())
            .await;

        assert!(matches!(
            outcome,
            FetchOutcome::Fetched { tier: Some(Tier::Challenge), .. }
        ));
        // A block escalates immediately instead of retrying the same tier
        assert_eq!(direct_calls.load(Ordering::SeqCst), 1);
        assert_eq!(challenge_calls.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("debug/erome/album_2.html").exists());
    }

    #[tokio::test]
    async fn test_not_found_stops_without_escalation() {
        let dir = tempfile::tempdir().unwrap();
        let (direct, _) = ScriptedTier::boxed(Tier::Direct, vec![status(404)]);
        let (challenge, challenge_calls) = ScriptedTier::boxed(Tier::Challenge, vec![]);
        let ladder = ladder(vec![direct, challenge], dir.path());

        let outcome = ladder
            .fetch_outcome("https://a.test/missing", "site", "", &FetchOptions::html())
            .await;
        assert_eq!(outcome, FetchOutcome::NotFound);
        assert_eq!(challenge_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_retries_same_tier() {
        let dir = tempfile::tempdir().unwrap();
        let page = good_page();
        let (direct, direct_calls) =
            ScriptedTier::boxed(Tier::Direct, vec![status(429), status(429), ok(&page)]);
        let ladder = ladder(vec![direct], dir.path());

        let content = ladder
            .fetch("https://a.test/3", "site", "", &FetchOptions::html())
            .await;
        assert_eq!(content, Some(page));
        assert_eq!(direct_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_escalate() {
        let dir = tempfile::tempdir().unwrap();
        let page = good_page();
        let (direct, direct_calls) = ScriptedTier::boxed(
            Tier::Direct,
            vec![status(500), Err("connection reset".into()), status(502)],
        );
        let (browser, _) = ScriptedTier::boxed(Tier::Browser, vec![ok(&page)]);
        let ladder = ladder(vec![direct, browser], dir.path());

        let outcome = ladder
            .fetch_outcome("https://a.test/4", "site", "four", &FetchOptions::html())
            .await;
        assert!(matches!(
            outcome,
            FetchOutcome::Fetched { tier: Some(Tier::Browser), .. }
        ));
        assert_eq!(direct_calls.load(Ordering::SeqCst), 3);
        // Last error body kept for diagnosis
        assert!(dir.path().join("debug/site/four.html").exists());
    }

    #[tokio::test]
    async fn test_all_tiers_fail_returns_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (direct, _) = ScriptedTier::boxed(Tier::Direct, vec![]);
        let (challenge, _) = ScriptedTier::boxed(Tier::Challenge, vec![ok("blocked")]);
        let ladder = ladder(vec![direct, challenge], dir.path());

        let outcome = ladder
            .fetch_outcome("https://a.test/5", "site", "", &FetchOptions::html())
            .await;
        assert_eq!(outcome, FetchOutcome::Unavailable);
        assert!(!ladder.cache.path_for("https://a.test/5").exists());
    }

    #[tokio::test]
    async fn test_start_and_max_tier_bound_the_ladder() {
        let dir = tempfile::tempdir().unwrap();
        let page = good_page();
        let (direct, direct_calls) = ScriptedTier::boxed(Tier::Direct, vec![ok(&page)]);
        let (challenge, challenge_calls) = ScriptedTier::boxed(Tier::Challenge, vec![ok(&page)]);
        let (browser, browser_calls) = ScriptedTier::boxed(Tier::Browser, vec![]);
        let ladder = ladder(vec![direct, challenge, browser], dir.path());

        let options = FetchOptions {
            max_tier: Tier::Challenge,
            ..FetchOptions::hard()
        }
        .without_cache();
        assert!(ladder.fetch("https://a.test/6", "s", "", &options).await.is_some());
        assert_eq!(direct_calls.load(Ordering::SeqCst), 0);
        assert_eq!(challenge_calls.load(Ordering::SeqCst), 1);
        assert_eq!(browser_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_json_skips_block_detection() {
        let dir = tempfile::tempdir().unwrap();
        let (direct, _) = ScriptedTier::boxed(Tier::Direct, vec![ok(r#"[{"id": 1}]"#)]);
        let ladder = ladder(vec![direct], dir.path());

        let value = ladder
            .fetch_json("https://api.test/posts", "kemono", "", &FetchOptions::json())
            .await
            .unwrap();
        assert_eq!(value[0]["id"], 1);
    }

    #[tokio::test]
    async fn test_cached_block_page_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let page = good_page();
        let (direct, direct_calls) = ScriptedTier::boxed(Tier::Direct, vec![ok(&page)]);
        let ladder = ladder(vec![direct], dir.path());
        ladder.cache.put("https://a.test/7", "<html>Just a moment</html>");

        let outcome = ladder
            .fetch_outcome("https://a.test/7", "site", "", &FetchOptions::html())
            .await;
        assert!(matches!(outcome, FetchOutcome::Fetched { from_cache: false, .. }));
        assert_eq!(direct_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fallback_slug() {
        assert_eq!(fallback_slug("https://a.test/x"), "https://a.test/x");
        let long = format!("https://a.test/{}", "y".repeat(60));
        assert_eq!(fallback_slug(&long).chars().count(), 40);
    }
}
