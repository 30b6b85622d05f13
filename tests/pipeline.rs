//! End-to-end runs through the public API with a scripted tier and adapter.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use albumdex::app::{Result, RunContext};
use albumdex::config::{Config, RetryConfig};
use albumdex::domain::{Record, Source};
use albumdex::fetcher::{
    BlockClassifier, DebugArtifacts, FetchLadder, FetchOptions, FetchTier, Pacer, ResponseCache,
    Tier, TierRequest, TierResponse,
};
use albumdex::pipeline;
use albumdex::sites::{Registry, SiteAdapter, Target};
use albumdex::store::{GuardVerdict, JsonStore};

struct OkTier;

#[async_trait]
impl FetchTier for OkTier {
    fn tier(&self) -> Tier {
        Tier::Direct
    }

    async fn attempt(&self, url: &str, _request: &TierRequest<'_>) -> Result<TierResponse> {
        Ok(TierResponse::new(200, url))
    }
}

/// One observation: site id, title, file count
type Observation = (String, String, u64);

/// Each target yields a fixed batch of observations
struct ScriptedAdapter {
    batches: Vec<Vec<Observation>>,
}

#[async_trait]
impl SiteAdapter for ScriptedAdapter {
    fn source(&self) -> Source {
        Source::Erome
    }

    fn fetch_options(&self) -> FetchOptions {
        FetchOptions::json()
    }

    async fn discover(&self, _ladder: &FetchLadder, _limit: usize) -> Result<Vec<Target>> {
        Ok((0..self.batches.len())
            .map(|i| Target::new(format!("https://listing.test/{i}"), i.to_string(), "all"))
            .collect())
    }

    fn parse(&self, _content: &str, target: &Target) -> Result<Vec<Record>> {
        let index: usize = target.slug.parse().unwrap_or(0);
        Ok(self.batches[index]
            .iter()
            .map(|(id, title, files)| {
                let mut record = Record::new(Source::Erome, id, format!("https://listing.test/a/{id}"));
                record.title = title.clone();
                record.file_count = *files;
                record
            })
            .collect())
    }

    fn recheck_target(&self, _record: &Record) -> Option<Target> {
        None
    }
}

fn context(dir: &Path, batches: Vec<Vec<Observation>>) -> RunContext {
    let mut config = Config::default();
    config.paths.output = dir.join("albums.json");
    config.paths.recheck = dir.join("recheck.json");
    config.paths.validation = dir.join("validation.json");

    let ladder = FetchLadder::new(
        vec![Box::new(OkTier)],
        ResponseCache::disabled(),
        DebugArtifacts::new(dir.join("debug")),
        BlockClassifier::default(),
        Pacer::immediate(),
        RetryConfig::default(),
    );
    let store = Box::new(JsonStore::from_paths(&config.paths));
    let registry = Registry::with_adapters(vec![Box::new(ScriptedAdapter { batches })]);
    RunContext::with_parts(config, ladder, store, registry)
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_placeholder_heavy_run_is_refused_but_written() {
    let dir = TempDir::new().unwrap();
    let batch: Vec<Observation> = (0..50)
        .map(|i| {
            let title = if i < 3 { "Just a moment".to_string() } else { format!("Album {i}") };
            (format!("{i}"), title, 5)
        })
        .collect();
    let ctx = context(dir.path(), vec![batch]);

    let report = pipeline::crawl(&ctx, false).await.unwrap();
    assert!(!report.passed());
    assert_eq!(
        report.verdict,
        GuardVerdict::TooManyPlaceholders { placeholders: 3, total: 50 }
    );

    let dataset = read_json(&dir.path().join("albums.json"));
    assert_eq!(dataset["meta"]["total"], 50);
    assert_eq!(dataset["albums"].as_array().unwrap().len(), 50);

    let recheck = read_json(&dir.path().join("recheck.json"));
    assert_eq!(recheck.as_array().unwrap().len(), 3);

    let validation = read_json(&dir.path().join("validation.json"));
    assert_eq!(validation["guard_passed"], false);

    // The same data goes through when forced
    let forced = pipeline::crawl(&ctx, true).await.unwrap();
    assert_eq!(forced.verdict, GuardVerdict::Forced);
    assert!(forced.passed());
}

#[tokio::test]
async fn test_placeholder_then_real_observation_merges() {
    let dir = TempDir::new().unwrap();
    let batches = vec![
        vec![("123".to_string(), "Just a moment".to_string(), 0)],
        vec![("123".to_string(), "Real Title".to_string(), 42)],
    ];
    let ctx = context(dir.path(), batches);

    let report = pipeline::crawl(&ctx, false).await.unwrap();
    assert_eq!(report.meta.total, 1);
    assert_eq!(report.verdict, GuardVerdict::Passed);

    let records = ctx.store.load().unwrap();
    let merged = records.get("erome:123").unwrap();
    assert_eq!(merged.title, "Real Title");
    assert_eq!(merged.file_count, 42);
    assert!(!merged.needs_recheck);
}
