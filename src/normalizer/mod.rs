//! Adapter-boundary validation and the merge engine.
//!
//! Every record an adapter produces passes through [`Normalizer::normalize`]
//! before it is folded into the collection with [`RecordSet::merge`].

pub mod merge;

pub use merge::{merge_record, MergeOutcome, RecordSet};

use tracing::warn;
use url::Url;

use crate::app::{AlbumdexError, Result};
use crate::domain::Record;

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    /// Validate and canonicalise a freshly parsed record
    pub fn normalize(&self, mut record: Record) -> Result<Record> {
        let prefix = format!("{}:", record.source.as_str());
        let has_site_id = record
            .id
            .strip_prefix(&prefix)
            .is_some_and(|site_id| !site_id.trim().is_empty());
        if !has_site_id {
            return Err(AlbumdexError::Validation {
                id: record.id,
                reason: format!("id must look like \"{}<id>\"", prefix),
            });
        }

        let url = Url::parse(record.url.trim()).map_err(|e| AlbumdexError::Validation {
            id: record.id.clone(),
            reason: format!("bad url {:?}: {}", record.url, e),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AlbumdexError::Validation {
                id: record.id,
                reason: format!("unsupported url scheme {:?}", url.scheme()),
            });
        }
        record.url = url.to_string();

        record.title = clean_title(&record.title);
        record.thumbnail = record
            .thumbnail
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        record.file_count = record
            .file_count
            .max(record.photo_count + record.video_count);
        record.has_videos |= record.video_count > 0;
        record.needs_recheck |= record.is_placeholder() || record.file_count == 0;

        Ok(record)
    }

    /// Normalize a batch, logging and dropping invalid records
    pub fn normalize_all(&self, records: Vec<Record>) -> Vec<Record> {
        records
            .into_iter()
            .filter_map(|record| match self.normalize(record) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Dropping record: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Decode HTML entities and collapse whitespace
pub fn clean_title(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
