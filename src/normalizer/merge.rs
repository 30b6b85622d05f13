use std::collections::BTreeMap;

use serde_json::Value;

use crate::domain::Record;

/// Whether a merged record was new to the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
}

/// Fold `incoming` into `existing`, keeping the best data seen so far.
///
/// Titles are only ever upgraded from a placeholder, counts never decrease,
/// and `needs_recheck` once cleared stays cleared.
pub fn merge_record(existing: &mut Record, incoming: Record) {
    if existing.is_placeholder() && !incoming.is_placeholder() {
        existing.title = incoming.title;
    }

    existing.file_count = existing.file_count.max(incoming.file_count);
    existing.photo_count = existing.photo_count.max(incoming.photo_count);
    existing.video_count = existing.video_count.max(incoming.video_count);
    existing.has_videos |= incoming.has_videos;

    if existing.thumbnail.as_deref().map_or(true, str::is_empty) {
        if let Some(thumbnail) = incoming.thumbnail.filter(|t| !t.is_empty()) {
            existing.thumbnail = Some(thumbnail);
        }
    }
    if existing.date.is_none() {
        existing.date = incoming.date;
    }
    if existing.url.is_empty() && !incoming.url.is_empty() {
        existing.url = incoming.url;
    }

    existing.needs_recheck &= incoming.needs_recheck;
    existing.extra.extend(incoming.extra);

    existing.source = incoming.source;
    existing.indexed_at = incoming.indexed_at;
}

/// The keyed record collection a run mutates.
///
/// Persisted entries that no longer decode as a [`Record`] (an unknown
/// source, a hand-edited field) are kept verbatim in `unreadable` so a save
/// writes them back instead of dropping them.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: BTreeMap<String, Record>,
    unreadable: Vec<Value>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, merging any repeated ids
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.merge(record);
        }
        set
    }

    pub fn merge(&mut self, incoming: Record) -> MergeOutcome {
        match self.records.get_mut(&incoming.id) {
            Some(existing) => {
                merge_record(existing, incoming);
                MergeOutcome::Updated
            }
            None => {
                self.records.insert(incoming.id.clone(), incoming);
                MergeOutcome::Inserted
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }

    /// Carry a persisted entry through untouched
    pub fn keep_unreadable(&mut self, entry: Value) {
        self.unreadable.push(entry);
    }

    pub fn unreadable(&self) -> &[Value] {
        &self.unreadable
    }
}
