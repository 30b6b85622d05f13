//! Site adapters.
//!
//! Each adapter enumerates [`Target`]s for its source (optionally fetching
//! listing pages through the ladder) and turns one fetched document into
//! zero or more [`Record`]s. The orchestrator drives them through the
//! [`SiteAdapter`] trait only.

pub mod bunkr;
pub mod cyberdrop;
pub mod eporner;
pub mod erome;
pub mod fapello;
pub mod kemono;

pub use bunkr::BunkrAdapter;
pub use cyberdrop::CyberdropAdapter;
pub use eporner::EpornerAdapter;
pub use erome::EromeAdapter;
pub use fapello::FapelloAdapter;
pub use kemono::KemonoAdapter;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::app::Result;
use crate::config::Config;
use crate::domain::{Record, Source};
use crate::fetcher::{FetchLadder, FetchOptions};

pub(crate) const PHOTO_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];
pub(crate) const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mov", ".avi", ".mkv"];

/// One document an adapter wants fetched and parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    /// Debug-artifact key, also the site id for per-entity pages
    pub slug: String,
    /// Targets sharing a group share an empty-streak counter
    pub group: String,
}

impl Target {
    pub fn new(url: impl Into<String>, slug: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            slug: slug.into(),
            group: group.into(),
        }
    }
}

/// A fetched document and the target it ended up coming from
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub target: Target,
    pub content: String,
}

#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// How targets of this source are fetched
    fn fetch_options(&self) -> FetchOptions;

    /// Enumerate the targets for a run producing at most `limit` records
    async fn discover(&self, ladder: &FetchLadder, limit: usize) -> Result<Vec<Target>>;

    /// Fetch one target. Adapters that rotate mirrors override this and
    /// report the URL that answered in the returned page's target.
    async fn fetch(
        &self,
        ladder: &FetchLadder,
        target: &Target,
        options: &FetchOptions,
    ) -> Option<Page> {
        let content = ladder
            .fetch(&target.url, self.source().as_str(), &target.slug, options)
            .await?;
        Some(Page {
            target: target.clone(),
            content,
        })
    }

    /// Turn one fetched document into records. Per-item problems are logged
    /// and skipped; an `Err` means the whole document was unusable.
    fn parse(&self, content: &str, target: &Target) -> Result<Vec<Record>>;

    /// Where to re-fetch a flagged record, if the source supports it
    fn recheck_target(&self, record: &Record) -> Option<Target>;

    /// Consecutive empty targets after which the rest of a group is skipped
    fn empty_streak_limit(&self) -> usize {
        3
    }
}

/// Adapters for the enabled sources, resolved once at startup.
pub struct Registry {
    adapters: Vec<Box<dyn SiteAdapter>>,
}

impl Registry {
    pub fn from_config(config: &Config) -> Self {
        let adapters = config
            .sources
            .enabled()
            .into_iter()
            .map(|source| adapter_for(source, config))
            .collect();
        Self { adapters }
    }

    pub fn with_adapters(adapters: Vec<Box<dyn SiteAdapter>>) -> Self {
        Self { adapters }
    }

    pub fn get(&self, source: Source) -> Option<&dyn SiteAdapter> {
        self.adapters
            .iter()
            .find(|a| a.source() == source)
            .map(|a| a.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn SiteAdapter> {
        self.adapters.iter().map(|a| a.as_ref())
    }

    pub fn sources(&self) -> Vec<Source> {
        self.adapters.iter().map(|a| a.source()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

fn adapter_for(source: Source, config: &Config) -> Box<dyn SiteAdapter> {
    match source {
        Source::Eporner => Box::new(EpornerAdapter),
        Source::Erome => Box::new(EromeAdapter),
        Source::Fapello => Box::new(FapelloAdapter::new(config.sources.fapello_max_pages)),
        Source::Kemono => Box::new(KemonoAdapter),
        Source::Bunkr => Box::new(BunkrAdapter::new(config.sources.bunkr_max_pages)),
        Source::Cyberdrop => Box::new(CyberdropAdapter::new(
            config.sources.cyberdrop_albums.clone(),
        )),
    }
}

pub(crate) fn has_extension(path: &str, extensions: &[&str]) -> bool {
    let lower = path.to_lowercase();
    // Ignore query strings on CDN URLs
    let lower = lower.split(['?', '#']).next().unwrap_or("");
    extensions.iter().any(|ext| lower.ends_with(ext))
}

/// Trimmed, non-empty `content` of the first element matching `selector`
pub(crate) fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Text of an element with each text node trimmed, joined by single spaces
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `max` characters of `s`
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
