use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::app::{AlbumdexError, Result};
use crate::domain::{is_placeholder_title, Record, Source};
use crate::fetcher::{FetchLadder, FetchOptions};
use crate::sites::{
    has_extension, truncate_chars, SiteAdapter, Target, PHOTO_EXTENSIONS, VIDEO_EXTENSIONS,
};

const BASE: &str = "https://kemono.su";
const API: &str = "https://kemono.su/api/v1";
const PER_PAGE: usize = 50;

const THUMB_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Recently updated posts from the public JSON API.
#[derive(Debug, Clone, Copy, Default)]
pub struct KemonoAdapter;

fn feed_url(offset: usize) -> String {
    format!("{API}/posts/recently-updated?limit={PER_PAGE}&offset={offset}")
}

/// Ids arrive as strings or numbers
fn id_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.trim().replacen(' ', "T", 1);
    if let Ok(date) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// File paths of a post: the primary file first, then attachments, deduplicated
fn file_paths(post: &Value) -> Vec<String> {
    let primary = post.pointer("/file/path").and_then(Value::as_str);
    let attachments = post
        .get("attachments")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|a| a.get("path").and_then(Value::as_str));

    let mut seen = HashSet::new();
    primary
        .into_iter()
        .chain(attachments)
        .filter(|p| !p.is_empty())
        .filter(|p| seen.insert(p.to_string()))
        .map(str::to_string)
        .collect()
}

/// Convert one API post object
pub fn parse_post(post: &Value) -> Option<Record> {
    let post_id = id_string(post.get("id"));
    let user_id = id_string(post.get("user"));
    let service = post
        .get("service")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();
    if post_id.is_empty() || user_id.is_empty() || service.is_empty() {
        return None;
    }

    let url = format!("{BASE}/{service}/user/{user_id}/post/{post_id}");
    let mut record = Record::new(
        Source::Kemono,
        &format!("{service}:{user_id}:{post_id}"),
        url,
    );

    let title = post
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    let paths = file_paths(post);
    record.file_count = paths.len() as u64;
    record.photo_count = paths
        .iter()
        .filter(|p| has_extension(p, PHOTO_EXTENSIONS))
        .count() as u64;
    record.video_count = paths
        .iter()
        .filter(|p| has_extension(p, VIDEO_EXTENSIONS))
        .count() as u64;
    record.has_videos = record.video_count > 0;
    record.thumbnail = paths
        .iter()
        .find(|p| has_extension(p, THUMB_EXTENSIONS) && p.starts_with('/'))
        .map(|p| format!("{BASE}/thumbnail{p}"));

    record.date = post
        .get("published")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| post.get("added").and_then(Value::as_str))
        .and_then(parse_date);

    record.needs_recheck = is_placeholder_title(&title) || record.file_count == 0;
    record.title = if title.is_empty() {
        format!("{service} post {post_id}")
    } else {
        title
    };

    let content = post.get("content").and_then(Value::as_str).unwrap_or("");
    record.set_extra("service", service);
    record.set_extra("user_id", user_id);
    record.set_extra("post_id", post_id);
    record.set_extra("content", truncate_chars(content, 500));

    Some(record)
}

#[async_trait]
impl SiteAdapter for KemonoAdapter {
    fn source(&self) -> Source {
        Source::Kemono
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions::json()
    }

    async fn discover(&self, _ladder: &FetchLadder, limit: usize) -> Result<Vec<Target>> {
        let pages = limit.div_ceil(PER_PAGE).max(1);
        Ok((0..pages)
            .map(|page| {
                let offset = page * PER_PAGE;
                Target::new(feed_url(offset), format!("recent_o{offset}"), "recent")
            })
            .collect())
    }

    fn parse(&self, content: &str, target: &Target) -> Result<Vec<Record>> {
        let value: Value = serde_json::from_str(content)?;

        // The feed is an array; single-post lookups return an object, sometimes wrapped
        let posts: Vec<&Value> = match &value {
            Value::Array(posts) => posts.iter().collect(),
            Value::Object(map) => match map.get("post") {
                Some(post @ Value::Object(_)) => vec![post],
                _ => vec![&value],
            },
            _ => {
                return Err(AlbumdexError::Parse(format!(
                    "{}: unexpected response shape",
                    target.url
                )))
            }
        };

        Ok(posts
            .into_iter()
            .filter_map(|post| {
                let record = parse_post(post);
                if record.is_none() {
                    warn!(url = %target.url, "[kemono] skipping post without id/user/service");
                }
                record
            })
            .collect())
    }

    fn recheck_target(&self, record: &Record) -> Option<Target> {
        let mut parts = record.site_id().splitn(3, ':');
        let (service, user, post) = (parts.next()?, parts.next()?, parts.next()?);
        Some(Target::new(
            format!("{API}/{service}/user/{user}/post/{post}"),
            format!("{service}_{user}_{post}"),
            "recheck",
        ))
    }

    fn empty_streak_limit(&self) -> usize {
        2
    }
}
