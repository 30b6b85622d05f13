use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::app::Result;
use crate::domain::{Record, Source};
use crate::fetcher::{FetchLadder, FetchOptions, Tier};
use crate::sites::{element_text, meta_content, Page, SiteAdapter, Target};

/// Known mirrors, primary first
pub const CYBERDROP_MIRRORS: &[&str] = &[
    "cyberdrop.me",
    "cyberdrop.to",
    "cyberdrop.cc",
    "cyberdrop.nl",
    "cyberdrop.bz",
];

static FILES_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s+files?").expect("valid files regex"));
static VIDEO_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href="[^"]*\.(mp4|webm|mov)""#).expect("valid video link regex")
});
static PHOTO_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href="[^"]*\.(jpg|jpeg|png|gif|webp)""#).expect("valid photo link regex")
});

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="og:title"]"#));
static OG_IMAGE: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="og:image"]"#));
static H1_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(r#"h1[class*="title"]"#));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static IMAGE_IMG: LazyLock<Selector> = LazyLock::new(|| selector(r#"img[class*="image"][src]"#));
static FILE_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"a[class*="image"], a[class*="file"], a[class*="download"]"#)
});
static GALLERY_IMAGES: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"div[id*="gallery"] img, div[id*="files"] img, div[id*="images"] img"#)
});

/// Albums from a configured id list; the site has no public directory.
///
/// Album pages sit behind a challenge on some mirrors, so fetches start on
/// the challenge tier and move to the next mirror when one refuses.
#[derive(Debug, Clone, Default)]
pub struct CyberdropAdapter {
    album_ids: Vec<String>,
}

impl CyberdropAdapter {
    pub fn new(album_ids: Vec<String>) -> Self {
        Self { album_ids }
    }
}

fn album_url(domain: &str, album_id: &str) -> String {
    format!("https://{domain}/a/{album_id}")
}

/// `first` followed by the other known mirrors
fn mirror_order(first: &str) -> Vec<&str> {
    let mut order = vec![first];
    order.extend(CYBERDROP_MIRRORS.iter().copied().filter(|m| *m != first));
    order
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| CYBERDROP_MIRRORS[0].to_string())
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
}

/// Parse one album page served by `domain`
pub fn parse_album(html: &str, album_id: &str, domain: &str) -> Record {
    let document = Html::parse_document(html);
    let canonical = album_url(CYBERDROP_MIRRORS[0], album_id);
    let mut record = Record::new(Source::Cyberdrop, album_id, canonical);

    record.title = meta_content(&document, &OG_TITLE)
        .or_else(|| first_text(&document, &H1_TITLE))
        .or_else(|| first_text(&document, &TITLE))
        .unwrap_or_else(|| format!("cyberdrop album {album_id}"));
    record.thumbnail = meta_content(&document, &OG_IMAGE).or_else(|| {
        document
            .select(&IMAGE_IMG)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(str::to_string)
    });

    let text = element_text(&document.root_element());
    let mut file_count = FILES_TEXT
        .captures(&text)
        .and_then(|c| c.get(1)?.as_str().parse::<u64>().ok())
        .unwrap_or(0);
    if file_count == 0 {
        file_count = document.select(&FILE_LINKS).count() as u64;
    }
    if file_count == 0 {
        file_count = document.select(&GALLERY_IMAGES).count() as u64;
    }

    let lower = html.to_lowercase();
    record.has_videos = lower.contains(".mp4") || lower.contains(".webm");
    record.video_count = VIDEO_LINK.find_iter(html).count() as u64;
    record.photo_count = PHOTO_LINK.find_iter(html).count() as u64;
    if file_count == 0 {
        file_count = record.photo_count + record.video_count;
    }
    record.file_count = file_count;
    record.needs_recheck = file_count == 0;
    record.set_extra("domain", domain);
    record
}

#[async_trait]
impl SiteAdapter for CyberdropAdapter {
    fn source(&self) -> Source {
        Source::Cyberdrop
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_tier: Tier::Challenge,
            ..FetchOptions::hard()
        }
    }

    async fn discover(&self, _ladder: &FetchLadder, limit: usize) -> Result<Vec<Target>> {
        if self.album_ids.is_empty() {
            info!("[cyberdrop] no album ids configured");
        }
        Ok(self
            .album_ids
            .iter()
            .take(limit)
            .map(|id| Target::new(album_url(CYBERDROP_MIRRORS[0], id), id.as_str(), "albums"))
            .collect())
    }

    /// Walk the mirrors, starting with the target's own host, sending the
    /// Referer and Origin each mirror expects.
    async fn fetch(
        &self,
        ladder: &FetchLadder,
        target: &Target,
        options: &FetchOptions,
    ) -> Option<Page> {
        let album_id = target.slug.as_str();
        let host = host_of(&target.url);
        for mirror in mirror_order(&host) {
            let url = album_url(mirror, album_id);
            let mirror_options = options
                .clone()
                .with_header("Referer", &format!("https://{mirror}/"))
                .with_header("Origin", &format!("https://{mirror}"));
            let fetched = ladder.fetch(&url, "cyberdrop", album_id, &mirror_options).await;
            if let Some(content) = fetched {
                return Some(Page {
                    target: Target::new(url, album_id, target.group.as_str()),
                    content,
                });
            }
            warn!(album_id, mirror, "[cyberdrop] mirror failed, trying the next one");
        }
        None
    }

    fn parse(&self, content: &str, target: &Target) -> Result<Vec<Record>> {
        Ok(vec![parse_album(content, &target.slug, &host_of(&target.url))])
    }

    fn recheck_target(&self, record: &Record) -> Option<Target> {
        let id = record.site_id();
        Some(Target::new(album_url(CYBERDROP_MIRRORS[0], id), id, "recheck"))
    }
}
