use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::app::Result;
use crate::domain::{Record, Source};
use crate::fetcher::{FetchLadder, FetchOptions};
use crate::sites::{
    element_text, has_extension, meta_content, SiteAdapter, Target, PHOTO_EXTENSIONS,
};

const BASE: &str = "https://www.erome.com";
const MAX_LISTING_PAGES: usize = 20;

const EROME_VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".webm"];

static ALBUM_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href=["'](?:https?://www\.erome\.com)?/a/([A-Za-z0-9_-]{4,30})["']"#)
        .expect("valid album link regex")
});

static ALBUM_FILES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?s)window\.albumFiles\s*=\s*(\[.+?\]);\s*(?:</script>|var |window\.)",
        r"(?s)var\s+albumFiles\s*=\s*(\[.+?\]);\s*(?:</script>|var |window\.)",
        r"(?s)albumFiles\s*=\s*(\[.+?\]);\s*(?:</script>|var |window\.)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid albumFiles regex"))
    .collect()
});

static IMAGE_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|webp)").expect("valid image regex"));
static VIDEO_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(mp4|webm)").expect("valid video regex"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="og:title"]"#));
static OG_IMAGE: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="og:image"]"#));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img[src]"));
static SOURCE: LazyLock<Selector> = LazyLock::new(|| selector("source[src]"));
static UPLOADER: LazyLock<Selector> = LazyLock::new(|| selector(r#"a[href*="/u/"]"#));

/// Album pages discovered from the front-page listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EromeAdapter;

fn listing_url(page: usize) -> String {
    if page > 1 {
        format!("{BASE}/?page={page}")
    } else {
        format!("{BASE}/")
    }
}

fn album_url(album_id: &str) -> String {
    format!("{BASE}/a/{album_id}")
}

/// Album ids linked from a listing page, in page order
pub fn album_ids(html: &str) -> Vec<String> {
    ALBUM_LINK
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// The inline `albumFiles` array, if the page carries one
pub fn album_files(html: &str) -> Vec<Value> {
    for pattern in ALBUM_FILES.iter() {
        let Some(captures) = pattern.captures(html) else {
            continue;
        };
        if let Some(Value::Array(files)) = captures
            .get(1)
            .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        {
            return files;
        }
    }
    Vec::new()
}

fn file_url(file: &Value) -> &str {
    file.get("url")
        .and_then(Value::as_str)
        .or_else(|| file.get("src").and_then(Value::as_str))
        .unwrap_or("")
}

fn video_poster(source: &ElementRef<'_>) -> Option<String> {
    source
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "video")
        .and_then(|video| video.value().attr("poster"))
        .map(str::to_string)
}

/// Parse one album page
pub fn parse_album(html: &str, album_id: &str) -> Record {
    let document = Html::parse_document(html);
    let mut record = Record::new(Source::Erome, album_id, album_url(album_id));

    let title = meta_content(&document, &OG_TITLE).or_else(|| {
        document
            .select(&TITLE)
            .next()
            .map(|t| element_text(&t).replace(" - Erome", "").trim().to_string())
            .filter(|t| !t.is_empty())
    });
    record.title = title.unwrap_or_else(|| format!("Erome album {album_id}"));
    record.thumbnail = meta_content(&document, &OG_IMAGE);

    let files = album_files(html);
    if !files.is_empty() {
        record.file_count = files.len() as u64;
        record.photo_count = files
            .iter()
            .filter(|f| has_extension(file_url(f), PHOTO_EXTENSIONS))
            .count() as u64;
        record.video_count = files
            .iter()
            .filter(|f| has_extension(file_url(f), EROME_VIDEO_EXTENSIONS))
            .count() as u64;
    } else {
        let images = document
            .select(&IMG)
            .filter(|img| img.value().attr("src").is_some_and(|s| IMAGE_SRC.is_match(s)))
            .count();
        let videos: Vec<ElementRef<'_>> = document
            .select(&SOURCE)
            .filter(|s| s.value().attr("src").is_some_and(|s| VIDEO_SRC.is_match(s)))
            .collect();

        record.photo_count = images as u64;
        record.video_count = videos.len() as u64;
        record.file_count = record.photo_count + record.video_count;
        if record.thumbnail.is_none() {
            record.thumbnail = videos.first().and_then(video_poster);
        }
    }
    record.has_videos = record.video_count > 0;
    record.needs_recheck = record.file_count == 0;

    let uploader = document
        .select(&UPLOADER)
        .next()
        .map(|a| element_text(&a))
        .unwrap_or_default();
    record.set_extra("uploader", uploader);

    record
}

#[async_trait]
impl SiteAdapter for EromeAdapter {
    fn source(&self) -> Source {
        Source::Erome
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions::hard()
    }

    async fn discover(&self, ladder: &FetchLadder, limit: usize) -> Result<Vec<Target>> {
        let max_pages = (limit / 20 + 1).min(MAX_LISTING_PAGES);
        let options = self.fetch_options();
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for page in 1..=max_pages {
            let slug = format!("listing_p{page}");
            let Some(html) = ladder.fetch(&listing_url(page), "erome", &slug, &options).await
            else {
                warn!(page, "[erome] listing page unavailable");
                break;
            };

            for id in album_ids(&html) {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }

            if ids.is_empty() && page == 1 {
                let path = ladder.debug_artifacts().save("erome", &slug, &html);
                error!(
                    path = ?path,
                    "[erome] No album ids on the first listing page"
                );
                break;
            }

            info!(page, found = ids.len(), "[erome] listing");
            if ids.len() >= limit {
                break;
            }
        }

        Ok(ids
            .into_iter()
            .take(limit)
            .map(|id| Target::new(album_url(&id), id, "albums"))
            .collect())
    }

    fn parse(&self, content: &str, target: &Target) -> Result<Vec<Record>> {
        Ok(vec![parse_album(content, &target.slug)])
    }

    fn recheck_target(&self, record: &Record) -> Option<Target> {
        let id = record.site_id();
        Some(Target::new(album_url(id), id, "recheck"))
    }

    fn empty_streak_limit(&self) -> usize {
        5
    }
}
