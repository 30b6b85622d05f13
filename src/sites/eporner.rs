use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{json, Value};
use tracing::warn;

use crate::app::{AlbumdexError, Result};
use crate::domain::{Record, Source};
use crate::fetcher::{FetchLadder, FetchOptions};
use crate::sites::{truncate_chars, SiteAdapter, Target};

const SEARCH_URL: &str = "https://www.eporner.com/api/v2/video/search/";
const BY_ID_URL: &str = "https://www.eporner.com/api/v2/video/id/";
const PER_PAGE: usize = 100;

/// Sort orders walked in turn for variety
const ORDERS: &[&str] = &["latest", "top-weekly", "top-monthly", "top-rated", "most-popular"];

/// Public JSON API, one record per video.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpornerAdapter;

fn search_url(order: &str, page: usize) -> String {
    format!(
        "{SEARCH_URL}?query=all&per_page={PER_PAGE}&page={page}&thumbsize=big&order={order}&gay=0&lq=1&format=json"
    )
}

/// Convert one API video object
pub fn parse_video(video: &Value) -> Option<Record> {
    let id = video.get("id").and_then(Value::as_str).map(str::trim)?;
    if id.is_empty() {
        return None;
    }

    let url = video
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://www.eporner.com/hd-porn/{id}/"));

    let mut record = Record::new(Source::Eporner, id, url);
    record.title = video
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    record.thumbnail = video
        .pointer("/default_thumb/src")
        .and_then(Value::as_str)
        .or_else(|| video.pointer("/thumbs/0/src").and_then(Value::as_str))
        .map(str::to_string);

    record.date = video
        .get("added")
        .and_then(Value::as_str)
        .and_then(|added| NaiveDateTime::parse_from_str(added, "%Y-%m-%d %H:%M:%S").ok())
        .map(|naive| naive.and_utc());

    record.file_count = 1;
    record.video_count = 1;
    record.has_videos = true;
    record.needs_recheck = record.title.chars().count() < 3;

    record.set_extra("length_sec", video.get("length_sec").cloned().unwrap_or(json!(0)));
    record.set_extra("length_min", video.get("length_min").cloned().unwrap_or(Value::Null));
    record.set_extra("views", video.get("views").cloned().unwrap_or(json!(0)));
    record.set_extra("rating", video.get("rate").cloned().unwrap_or(json!("0")));
    let keywords = video.get("keywords").and_then(Value::as_str).unwrap_or("");
    record.set_extra("keywords", truncate_chars(keywords, 300));
    record.set_extra("embed", video.get("embed").cloned().unwrap_or(Value::Null));

    Some(record)
}

#[async_trait]
impl SiteAdapter for EpornerAdapter {
    fn source(&self) -> Source {
        Source::Eporner
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions::json()
    }

    async fn discover(&self, _ladder: &FetchLadder, limit: usize) -> Result<Vec<Target>> {
        let pages = limit.div_ceil(PER_PAGE).max(1);
        Ok(ORDERS
            .iter()
            .flat_map(|order| {
                (1..=pages).map(move |page| {
                    Target::new(search_url(order, page), format!("{order}_p{page}"), *order)
                })
            })
            .collect())
    }

    fn parse(&self, content: &str, target: &Target) -> Result<Vec<Record>> {
        let value: Value = serde_json::from_str(content)?;

        // Search responses wrap a page of videos; the by-id endpoint returns one
        let videos: Vec<&Value> = match value.get("videos") {
            Some(Value::Array(videos)) => videos.iter().collect(),
            Some(_) => {
                return Err(AlbumdexError::Parse(format!(
                    "{}: \"videos\" is not an array",
                    target.url
                )))
            }
            None if value.get("id").is_some() => vec![&value],
            None => Vec::new(),
        };

        Ok(videos
            .into_iter()
            .filter_map(|video| {
                let record = parse_video(video);
                if record.is_none() {
                    warn!(url = %target.url, "[eporner] skipping video without id");
                }
                record
            })
            .collect())
    }

    fn recheck_target(&self, record: &Record) -> Option<Target> {
        let id = record.site_id();
        Some(Target::new(
            format!("{BY_ID_URL}?id={id}&thumbsize=big&format=json"),
            id,
            "recheck",
        ))
    }

    fn empty_streak_limit(&self) -> usize {
        // An empty page means the order is exhausted
        1
    }
}
