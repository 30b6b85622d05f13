use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::seq::SliceRandom;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{error, info, warn};

use crate::app::Result;
use crate::domain::{Record, Source};
use crate::fetcher::{FetchLadder, FetchOptions};
use crate::sites::{meta_content, Page, SiteAdapter, Target};

const DIRECTORY: &str = "https://bunkr-albums.io/";
const CANONICAL_DOMAIN: &str = "bunkr.si";

/// Mirrors serving the same albums
pub const BUNKR_DOMAINS: &[&str] = &[
    "bunkr.si",
    "bunkr.cr",
    "bunkr.fi",
    "bunkr.ph",
    "bunkr.pk",
    "bunkr.ps",
    "bunkr.ws",
    "bunkr.black",
    "bunkr.red",
    "bunkr.media",
    "bunkr.site",
];

/// Mirrors tried per album before giving up
const DOMAINS_PER_ALBUM: usize = 3;

static ALBUM_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href=["'](?:https?://bunkr[^"'/]+)?/a/([A-Za-z0-9_-]{4,24})["']"#)
        .expect("valid album link regex")
});
static ALBUM_FILES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)window\.albumFiles\s*=\s*\[(.+?)\];\s*(?:</script>|var )")
        .expect("valid albumFiles regex")
});
static FILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""id"\s*:"#).expect("valid file id regex"));
static FILES_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+files?").expect("valid files regex"));
static VIDEO_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.mp4|\.webm|\.mov").expect("valid video regex"));
static SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"class="font-semibold">\(([^)]+)\)"#).expect("valid size regex")
});
static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"timestamp:\s*"([^"]+)""#).expect("valid timestamp regex"));

static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector")
});
static OG_IMAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:image"]"#).expect("valid selector")
});

/// Albums listed on the bunkr-albums.io directory.
///
/// The sites sit behind bot management that only a real browser gets
/// through, so every fetch goes straight to the browser tier.
#[derive(Debug, Clone)]
pub struct BunkrAdapter {
    max_pages: u32,
}

impl BunkrAdapter {
    pub fn new(max_pages: u32) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }
}

fn listing_url(page: u32) -> String {
    if page > 1 {
        format!("{DIRECTORY}?page={page}")
    } else {
        DIRECTORY.to_string()
    }
}

fn album_url(album_id: &str) -> String {
    format!("https://{CANONICAL_DOMAIN}/a/{album_id}")
}

fn mirror_url(domain: &str, album_id: &str) -> String {
    format!("https://{domain}/a/{album_id}?advanced=1")
}

/// Album ids linked from a directory page, deduplicated in page order
pub fn album_ids(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    ALBUM_LINK
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn file_count(html: &str) -> u64 {
    let from_script = ALBUM_FILES
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|files| (FILE_ID.find_iter(files.as_str()).count() as u64).max(1));
    from_script
        .or_else(|| {
            FILES_TEXT
                .captures(html)
                .and_then(|c| c.get(1)?.as_str().parse().ok())
        })
        .unwrap_or(0)
}

/// `"HH:MM:SS DD/MM/YYYY"` from the page script, read as UTC
fn upload_date(html: &str) -> Option<DateTime<Utc>> {
    let raw = TIMESTAMP.captures(html)?.get(1)?.as_str();
    NaiveDateTime::parse_from_str(raw, "%H:%M:%S %d/%m/%Y")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Parse an album page served by `domain`. `None` when the page has
/// neither a title nor any files, i.e. it is not an album page.
pub fn parse_album(html: &str, album_id: &str, domain: &str) -> Option<Record> {
    let document = Html::parse_document(html);
    let title = meta_content(&document, &OG_TITLE);
    let file_count = file_count(html);
    if title.is_none() && file_count == 0 {
        return None;
    }

    let mut record = Record::new(Source::Bunkr, album_id, album_url(album_id));
    record.title = title.unwrap_or_else(|| album_id.to_string());
    record.thumbnail = meta_content(&document, &OG_IMAGE);
    record.has_videos = VIDEO_HINT.is_match(html);
    // The page only tells whether there is video, not how much
    record.video_count = u64::from(record.has_videos);
    record.photo_count = file_count.saturating_sub(record.video_count);
    record.file_count = file_count;
    record.date = upload_date(html);
    record.needs_recheck = file_count == 0;

    record.set_extra("domain", domain);
    if let Some(size) = SIZE.captures(html).and_then(|c| c.get(1)) {
        record.set_extra("size", size.as_str().trim());
    }
    Some(record)
}

/// Keeps an album every mirror refused, so the next recheck retries it
fn stub(album_id: &str) -> Record {
    let mut record = Record::new(Source::Bunkr, album_id, album_url(album_id));
    record.title = album_id.to_string();
    record.needs_recheck = true;
    record
}

#[async_trait]
impl SiteAdapter for BunkrAdapter {
    fn source(&self) -> Source {
        Source::Bunkr
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions::browser_only()
    }

    async fn discover(&self, ladder: &FetchLadder, limit: usize) -> Result<Vec<Target>> {
        let options = self.fetch_options();
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for page in 1..=self.max_pages {
            let slug = format!("listing_p{page}");
            let Some(html) = ladder.fetch(&listing_url(page), "bunkr", &slug, &options).await
            else {
                warn!(page, "[bunkr] directory page unavailable");
                break;
            };

            let before = ids.len();
            for id in album_ids(&html) {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            let found = ids.len() - before;

            if ids.is_empty() && page == 1 {
                let path = ladder.debug_artifacts().save("bunkr", &slug, &html);
                error!(path = ?path, "[bunkr] No album ids on the first directory page");
                break;
            }
            info!(page, new = found, total = ids.len(), "[bunkr] directory");
            if found == 0 || ids.len() >= limit {
                break;
            }
        }

        Ok(ids
            .into_iter()
            .take(limit)
            .map(|id| Target::new(album_url(&id), id, "albums"))
            .collect())
    }

    /// Try a few random mirrors. When all of them fail the page comes back
    /// empty and parses to a stub flagged for recheck.
    async fn fetch(
        &self,
        ladder: &FetchLadder,
        target: &Target,
        options: &FetchOptions,
    ) -> Option<Page> {
        let album_id = target.slug.as_str();
        let domains: Vec<&str> = {
            let mut rng = rand::thread_rng();
            BUNKR_DOMAINS
                .choose_multiple(&mut rng, DOMAINS_PER_ALBUM)
                .copied()
                .collect()
        };

        for domain in domains {
            let url = mirror_url(domain, album_id);
            let Some(html) = ladder.fetch(&url, "bunkr", album_id, options).await else {
                continue;
            };
            if parse_album(&html, album_id, domain).is_some() {
                return Some(Page {
                    target: Target::new(url, album_id, target.group.as_str()),
                    content: html,
                });
            }
            warn!(album_id, domain, "[bunkr] mirror served no album");
        }

        warn!(album_id, "[bunkr] every mirror failed, keeping a stub");
        Some(Page {
            target: target.clone(),
            content: String::new(),
        })
    }

    fn parse(&self, content: &str, target: &Target) -> Result<Vec<Record>> {
        let domain = url::Url::parse(&target.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| CANONICAL_DOMAIN.to_string());
        let record =
            parse_album(content, &target.slug, &domain).unwrap_or_else(|| stub(&target.slug));
        Ok(vec![record])
    }

    fn recheck_target(&self, record: &Record) -> Option<Target> {
        let id = record.site_id();
        Some(Target::new(album_url(id), id, "recheck"))
    }
}
