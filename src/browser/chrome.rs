use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use chrono::Utc;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::app::{AlbumdexError, Result};
use crate::browser::session::{SessionState, StoredCookie};
use crate::browser::{stealth, BrowserConfig};
use crate::config::FetchConfig;
use crate::fetcher::{BlockClassifier, FetchTier, Tier, TierRequest, TierResponse};

struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

enum SessionSlot {
    /// Not launched yet
    Idle,
    Ready(ChromeSession),
    /// Launch failed or the tier was shut down
    Unavailable,
}

/// Tier 3: a real, lazily launched Chrome reused for the whole run.
///
/// Cookies earned by passing a challenge are written to the storage-state
/// file and restored into every new page, so later runs start cleared.
pub struct BrowserTier {
    config: BrowserConfig,
    user_agent: String,
    state_path: PathBuf,
    classifier: BlockClassifier,
    slot: Mutex<SessionSlot>,
}

fn browser_error(context: &str) -> impl Fn(chromiumoxide::error::CdpError) -> AlbumdexError + '_ {
    move |e| AlbumdexError::Browser(format!("{}: {}", context, e))
}

impl BrowserTier {
    pub fn new(config: BrowserConfig, fetch: &FetchConfig, state_path: PathBuf) -> Self {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| fetch.user_agent.clone());
        Self {
            config,
            user_agent,
            state_path,
            classifier: BlockClassifier::new(fetch.min_content_bytes),
            slot: Mutex::new(SessionSlot::Idle),
        }
    }

    async fn launch(&self) -> Result<ChromeSession> {
        let (width, height) = self.config.window_size;
        let mut builder = ChromeConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--lang={}", self.config.languages.join(",")))
            .window_size(width, height);

        if !self.config.headless {
            builder = builder.with_head();
        }

        let chrome_config = builder
            .build()
            .map_err(|e| AlbumdexError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(chrome_config).await.map_err(|e| {
            AlbumdexError::Browser(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!(headless = self.config.headless, "Browser launched");
        Ok(ChromeSession { browser, handler })
    }

    async fn render(&self, browser: &Browser, url: &str) -> Result<String> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(browser_error("Failed to create page"))?;

        let result = self.render_on(&page, url).await;

        if let Err(e) = page.close().await {
            debug!(url, "Failed to close page: {}", e);
        }
        result
    }

    async fn render_on(&self, page: &Page, url: &str) -> Result<String> {
        page.set_user_agent(&self.user_agent)
            .await
            .map_err(browser_error("Failed to set user agent"))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            stealth::masking_script(&self.config),
        ))
        .await
        .map_err(browser_error("Failed to install init script"))?;

        let stored = SessionState::load(&self.state_path, Utc::now());
        let cookies: Vec<_> = stored.cookies.iter().filter_map(StoredCookie::to_param).collect();
        if !cookies.is_empty() {
            debug!(count = cookies.len(), "Restoring browser cookies");
            page.set_cookies(cookies)
                .await
                .map_err(browser_error("Failed to restore cookies"))?;
        }

        match tokio::time::timeout(self.config.timeout(), page.goto(url)).await {
            Ok(navigation) => {
                navigation.map_err(browser_error("Navigation failed"))?;
            }
            Err(_) => {
                return Err(AlbumdexError::Browser(format!(
                    "Navigation timed out after {}s",
                    self.config.timeout_secs
                )))
            }
        }

        tokio::time::sleep(self.config.wait_after_load()).await;
        let mut content = page
            .content()
            .await
            .map_err(browser_error("Failed to read page content"))?;

        if self.classifier.is_blocked(&content) {
            info!(
                url,
                "[browser] challenge still showing, waiting {}s",
                self.config.challenge_wait_secs
            );
            tokio::time::sleep(self.config.challenge_wait()).await;
            content = page
                .content()
                .await
                .map_err(browser_error("Failed to read page content"))?;
        }

        if !self.classifier.is_blocked(&content) {
            self.persist_cookies(page).await;
        }

        Ok(content)
    }

    async fn persist_cookies(&self, page: &Page) {
        let cookies = match page.get_cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!("Failed to read browser cookies: {}", e);
                return;
            }
        };
        let state = SessionState::new(cookies.iter().map(StoredCookie::from).collect());
        match state.save(&self.state_path) {
            Ok(()) => debug!(
                count = state.cookies.len(),
                path = %self.state_path.display(),
                "Saved browser cookies"
            ),
            Err(e) => warn!("{}", e),
        }
    }
}

#[async_trait]
impl FetchTier for BrowserTier {
    fn tier(&self) -> Tier {
        Tier::Browser
    }

    async fn attempt(&self, url: &str, _request: &TierRequest<'_>) -> Result<TierResponse> {
        let mut slot = self.slot.lock().await;

        if matches!(*slot, SessionSlot::Idle) {
            match self.launch().await {
                Ok(session) => *slot = SessionSlot::Ready(session),
                Err(e) => {
                    warn!("{}; browser tier disabled for this run", e);
                    *slot = SessionSlot::Unavailable;
                    return Err(e);
                }
            }
        }

        let SessionSlot::Ready(session) = &*slot else {
            return Err(AlbumdexError::Browser("browser tier unavailable".to_string()));
        };

        let body = self.render(&session.browser, url).await?;
        debug!(url, bytes = body.len(), "[browser] response");
        // No HTTP status is observable through the page; a rendered page counts as 200
        Ok(TierResponse::new(200, body))
    }

    async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        let previous = std::mem::replace(&mut *slot, SessionSlot::Unavailable);
        if let SessionSlot::Ready(mut session) = previous {
            if let Err(e) = session.browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            let _ = session.browser.wait().await;
            session.handler.abort();
            info!("Browser closed");
        }
    }
}
