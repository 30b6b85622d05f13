use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Record, Source};

/// Aggregate counters published alongside the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub total: usize,
    pub last_updated: DateTime<Utc>,
    pub new_this_run: usize,
    pub placeholder_count: usize,
    pub recheck_count: usize,
    pub sources: Vec<Source>,
}

impl RunMeta {
    pub fn compute(records: &[Record], new_this_run: usize) -> Self {
        let sources: BTreeSet<Source> = records.iter().map(|r| r.source).collect();

        Self {
            total: records.len(),
            last_updated: Utc::now(),
            new_this_run,
            placeholder_count: records.iter().filter(|r| r.is_placeholder()).count(),
            recheck_count: records.iter().filter(|r| r.needs_recheck).count(),
            sources: sources.into_iter().collect(),
        }
    }
}

/// Flattened run-health document for automated checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(flatten)]
    pub meta: RunMeta,
    pub per_source: BTreeMap<Source, usize>,
    pub guard: String,
    pub guard_passed: bool,
}

impl ValidationReport {
    pub fn new(meta: RunMeta, records: &[Record], guard: String, guard_passed: bool) -> Self {
        let mut per_source = BTreeMap::new();
        for record in records {
            *per_source.entry(record.source).or_insert(0) += 1;
        }

        Self {
            meta,
            per_source,
            guard,
            guard_passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: Source, id: &str, title: &str, recheck: bool) -> Record {
        let mut r = Record::new(source, id, format!("https://example.com/{id}"));
        r.title = title.into();
        r.needs_recheck = recheck;
        r
    }

    #[test]
    fn test_compute_counts() {
        let records = vec![
            record(Source::Erome, "1", "Good", false),
            record(Source::Erome, "2", "Just a moment", true),
            record(Source::Kemono, "3", "Other", true),
        ];
        let meta = RunMeta::compute(&records, 2);

        assert_eq!(meta.total, 3);
        assert_eq!(meta.new_this_run, 2);
        assert_eq!(meta.placeholder_count, 1);
        assert_eq!(meta.recheck_count, 2);
        assert_eq!(meta.sources, vec![Source::Erome, Source::Kemono]);
    }

    #[test]
    fn test_compute_empty() {
        let meta = RunMeta::compute(&[], 0);
        assert_eq!(meta.total, 0);
        assert!(meta.sources.is_empty());
    }

    #[test]
    fn test_validation_report_flattens_meta() {
        let records = vec![
            record(Source::Erome, "1", "Good", false),
            record(Source::Fapello, "2", "Good too", false),
            record(Source::Fapello, "3", "Also good", false),
        ];
        let meta = RunMeta::compute(&records, 0);
        let report = ValidationReport::new(meta, &records, "passed".into(), true);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["total"], 3);
        assert_eq!(value["per_source"]["fapello"], 2);
        assert_eq!(value["per_source"]["erome"], 1);
        assert_eq!(value["guard_passed"], true);
    }
}
