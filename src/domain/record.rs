use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::source::Source;
use crate::domain::title::is_placeholder_title;

/// One indexed album, gallery, post or video.
///
/// `id` has the form `"{source}:{site-specific-id}"` and is the key the merge
/// engine deduplicates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub source: Source,
    pub url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub photo_count: u64,
    #[serde(default)]
    pub video_count: u64,
    #[serde(default)]
    pub has_videos: bool,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    pub indexed_at: DateTime<Utc>,
    #[serde(default)]
    pub needs_recheck: bool,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Record {
    pub fn new(source: Source, site_id: &str, url: impl Into<String>) -> Self {
        Self {
            id: source.record_id(site_id),
            title: String::new(),
            source,
            url: url.into(),
            thumbnail: None,
            file_count: 0,
            photo_count: 0,
            video_count: 0,
            has_videos: false,
            date: None,
            indexed_at: Utc::now(),
            needs_recheck: false,
            extra: Map::new(),
        }
    }

    /// The part of the id after `"{source}:"`
    pub fn site_id(&self) -> &str {
        self.id
            .strip_prefix(self.source.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
            .unwrap_or(&self.id)
    }

    pub fn is_placeholder(&self) -> bool {
        is_placeholder_title(&self.title)
    }

    /// Timestamp used to order the published dataset
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.date.unwrap_or(self.indexed_at)
    }

    pub fn set_extra(&mut self, key: &str, value: impl Into<Value>) {
        self.extra.insert(key.to_string(), value.into());
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }
}
