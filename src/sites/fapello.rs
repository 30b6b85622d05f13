use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::app::Result;
use crate::domain::{is_placeholder_title, Record, Source};
use crate::fetcher::{FetchLadder, FetchOptions};
use crate::sites::{element_text, SiteAdapter, Target};

const BASE: &str = "https://fapello.com";

/// Pages walked in each secondary feed
const SECTION_PAGES: u32 = 5;
const SECTIONS: &[&str] = &["hot", "popular", "trending"];

/// Site navigation that looks like a model slug
const SKIP_SLUGS: &[&str] = &[
    "hot",
    "trending",
    "popular",
    "forum",
    "login",
    "signup",
    "welcome",
    "random",
    "posts",
    "submit",
    "videos",
    "contacts",
    "activity",
    "daily-search-ranking",
    "top-likes",
    "top-followers",
    "popular_videos",
    "what-is-fapello",
    "a",
];

/// Ancestors searched for a thumbnail, a display name and counts
const THUMB_DEPTH: usize = 6;
const NAME_DEPTH: usize = 5;
const COUNT_DEPTH: usize = 6;

const CONTAINER_TAGS: &[&str] = &["div", "article", "li", "section", "figure"];
const STOP_TAGS: &[&str] = &["body", "html", "main", "nav", "header", "footer", "aside"];

static MODEL_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://fapello\.com)?/([a-zA-Z0-9][a-zA-Z0-9_.-]{1,59})$")
        .expect("valid model href regex")
});
static TRAILING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{3,}$").expect("valid digits regex"));
static PHOTOS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\+\s*(\d+)\s*photos?").expect("valid photos regex"));
static VIDEOS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\+\s*(\d+)\s*videos?").expect("valid videos regex"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img[src]"));
static NAME_TAGS: LazyLock<Selector> = LazyLock::new(|| selector("p, h2, h3, h4, span"));

/// Model cards from the listing feeds.
#[derive(Debug, Clone, Copy)]
pub struct FapelloAdapter {
    max_pages: u32,
}

impl FapelloAdapter {
    pub fn new(max_pages: u32) -> Self {
        Self { max_pages }
    }
}

fn section_url(section: &str, page: u32) -> String {
    match (section, page) {
        ("new", 1) => format!("{BASE}/"),
        ("new", _) => format!("{BASE}/page-{page}/"),
        (_, 1) => format!("{BASE}/{section}/"),
        _ => format!("{BASE}/{section}/page-{page}/"),
    }
}

fn model_slug(href: &str) -> Option<&str> {
    let href = href.trim().trim_end_matches('/');
    let slug = MODEL_HREF.captures(href)?.get(1)?.as_str();
    if SKIP_SLUGS.contains(&slug) || slug.starts_with("page-") || TRAILING_DIGITS.is_match(slug) {
        return None;
    }
    Some(slug)
}

/// The link itself followed by its element ancestors
fn self_and_ancestors<'a>(link: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    std::iter::once(link).chain(link.ancestors().filter_map(ElementRef::wrap))
}

fn find_thumbnail(link: ElementRef<'_>, slug: &str) -> String {
    let prefix: String = slug.chars().take(5).collect();
    let found = self_and_ancestors(link).take(THUMB_DEPTH).find_map(|node| {
        node.select(&IMG)
            .filter_map(|img| img.value().attr("src"))
            .find(|src| src.contains("/content/") && src.contains("/1000/") && src.contains(&prefix))
            .map(|src| {
                if src.starts_with("http") {
                    src.to_string()
                } else {
                    format!("{BASE}{src}")
                }
            })
    });

    found.unwrap_or_else(|| {
        let mut chars = slug.chars();
        let c0 = chars.next().unwrap_or('_');
        let c1 = chars.next().unwrap_or('_');
        format!("{BASE}/content/{c0}/{c1}/{slug}/1000/{slug}_0001.jpg")
    })
}

fn is_name_candidate(text: &str) -> bool {
    let len = text.chars().count();
    (2..=80).contains(&len) && !text.starts_with('+') && !text.starts_with("http")
}

fn find_name(link: ElementRef<'_>, slug: &str) -> String {
    let nearby = self_and_ancestors(link).take(NAME_DEPTH).find_map(|node| {
        node.select(&NAME_TAGS)
            .take(6)
            .map(|tag| element_text(&tag))
            .find(|t| is_name_candidate(t))
    });
    if let Some(name) = nearby {
        return name;
    }

    let own = element_text(&link);
    if own.chars().count() >= 2 {
        return own;
    }
    title_case(slug)
}

fn title_case(slug: &str) -> String {
    slug.split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn sum_matches(pattern: &Regex, text: &str) -> Option<u64> {
    let mut found = false;
    let total: u64 = pattern
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
        .inspect(|_| found = true)
        .sum();
    found.then_some(total)
}

/// `+N photos` / `+N videos` inside the link, else in the nearest card container
fn find_counts(link: ElementRef<'_>) -> (u64, u64) {
    let counts_in = |text: &str| -> Option<(u64, u64)> {
        let photos = sum_matches(&PHOTOS, text);
        let videos = sum_matches(&VIDEOS, text);
        if photos.is_none() && videos.is_none() {
            return None;
        }
        Some((photos.unwrap_or(0), videos.unwrap_or(0)))
    };

    let own: String = link.text().collect();
    if let Some(counts) = counts_in(&own) {
        return counts;
    }

    for node in link.ancestors().filter_map(ElementRef::wrap).take(COUNT_DEPTH) {
        let name = node.value().name();
        if STOP_TAGS.contains(&name) {
            break;
        }
        let text: String = node.text().collect();
        if let Some(counts) = counts_in(&text) {
            if CONTAINER_TAGS.contains(&name) {
                return counts;
            }
        }
    }
    (0, 0)
}

/// Parse one listing page into model records, one per slug
pub fn parse_listing(html: &str) -> Vec<Record> {
    let document = Html::parse_document(html);
    let mut models: Vec<Record> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for link in document.select(&LINK) {
        let Some(slug) = link.value().attr("href").and_then(model_slug) else {
            continue;
        };

        let thumbnail = find_thumbnail(link, slug);
        let name = find_name(link, slug);
        let (photos, videos) = find_counts(link);

        if let Some(&i) = index.get(slug) {
            let model = &mut models[i];
            model.photo_count += photos;
            model.video_count += videos;
            model.file_count = model.photo_count + model.video_count;
            model.has_videos |= videos > 0;
            if model.thumbnail.is_none() {
                model.thumbnail = Some(thumbnail);
            }
            if model.needs_recheck && !is_placeholder_title(&name) {
                model.title = name;
                model.needs_recheck = false;
            }
            continue;
        }

        let mut record = Record::new(Source::Fapello, slug, format!("{BASE}/{slug}/"));
        record.needs_recheck = is_placeholder_title(&name);
        record.title = name;
        record.thumbnail = Some(thumbnail);
        record.photo_count = photos;
        record.video_count = videos;
        record.file_count = photos + videos;
        record.has_videos = videos > 0;
        record.set_extra("slug", slug);

        index.insert(slug.to_string(), models.len());
        models.push(record);
    }

    models
}

#[async_trait]
impl SiteAdapter for FapelloAdapter {
    fn source(&self) -> Source {
        Source::Fapello
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions::hard()
    }

    async fn discover(&self, _ladder: &FetchLadder, _limit: usize) -> Result<Vec<Target>> {
        let feeds = std::iter::once(("new", self.max_pages))
            .chain(SECTIONS.iter().map(|s| (*s, SECTION_PAGES)));

        Ok(feeds
            .flat_map(|(section, pages)| {
                (1..=pages).map(move |page| {
                    Target::new(section_url(section, page), format!("{section}_p{page}"), section)
                })
            })
            .collect())
    }

    fn parse(&self, content: &str, _target: &Target) -> Result<Vec<Record>> {
        Ok(parse_listing(content))
    }

    fn recheck_target(&self, _record: &Record) -> Option<Target> {
        // Models are refreshed by the listing feeds
        None
    }
}
