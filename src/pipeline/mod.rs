//! The sequential run: adapters → ladder → parse → normalize → merge → publish.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{error, info, warn};

use crate::app::{Result, RunContext};
use crate::domain::{Record, RunMeta, Source, ValidationReport};
use crate::fetcher::FetchOptions;
use crate::normalizer::{MergeOutcome, RecordSet};
use crate::sites::{SiteAdapter, Target};
use crate::store::{self, CommitGuard, GuardVerdict};

/// What one source contributed to a run
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: Source,
    pub targets: usize,
    /// Targets that fetched nothing or parsed to no valid records
    pub empty_targets: usize,
    /// Distinct ids produced this run
    pub records: usize,
    /// Ids that were not in the collection before
    pub new_records: usize,
    pub skipped_groups: Vec<String>,
    /// Discovery failure that stopped the source
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: Source) -> Self {
        Self {
            source,
            targets: 0,
            empty_targets: 0,
            records: 0,
            new_records: 0,
            skipped_groups: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub meta: RunMeta,
    pub verdict: GuardVerdict,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }
}

/// Per-source bookkeeping while targets are processed
struct SourceRun<'a> {
    adapter: &'a dyn SiteAdapter,
    options: FetchOptions,
    limit: usize,
    seen: HashSet<String>,
    report: SourceReport,
}

impl<'a> SourceRun<'a> {
    fn new(adapter: &'a dyn SiteAdapter, options: FetchOptions, limit: usize) -> Self {
        Self {
            adapter,
            options,
            limit,
            seen: HashSet::new(),
            report: SourceReport::new(adapter.source()),
        }
    }

    fn is_full(&self) -> bool {
        self.seen.len() >= self.limit
    }

    /// Fetch, parse, normalize and merge one target. Returns the number of
    /// valid records it produced.
    async fn process(&mut self, ctx: &RunContext, target: &Target, records: &mut RecordSet) -> usize {
        let source = self.adapter.source();
        self.report.targets += 1;

        let Some(page) = self.adapter.fetch(&ctx.ladder, target, &self.options).await else {
            warn!(source = %source, url = %target.url, "No usable content");
            self.report.empty_targets += 1;
            return 0;
        };

        let parsed = match self.adapter.parse(&page.content, &page.target) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(source = %source, url = %target.url, "Parse error: {}", e);
                self.report.empty_targets += 1;
                return 0;
            }
        };

        let normalized = ctx.normalizer.normalize_all(parsed);
        if normalized.is_empty() {
            self.report.empty_targets += 1;
            return 0;
        }

        let produced = normalized.len();
        for record in normalized {
            if !self.seen.contains(&record.id) {
                if self.is_full() {
                    break;
                }
                self.seen.insert(record.id.clone());
            }
            if records.merge(record) == MergeOutcome::Inserted {
                self.report.new_records += 1;
            }
        }
        self.report.records = self.seen.len();

        info!(
            source = %source,
            slug = %target.slug,
            parsed = produced,
            total = self.seen.len(),
            "Processed target"
        );
        produced
    }
}

/// Walk targets in order, skipping the rest of a group after too many
/// consecutive empty targets.
async fn run_targets(
    ctx: &RunContext,
    run: &mut SourceRun<'_>,
    targets: &[Target],
    records: &mut RecordSet,
) {
    let streak_limit = run.adapter.empty_streak_limit().max(1);
    let mut streaks: HashMap<&str, usize> = HashMap::new();

    for target in targets {
        if run.is_full() {
            info!(source = %run.report.source, limit = run.limit, "Reached max records");
            break;
        }
        if run.report.skipped_groups.iter().any(|g| g == &target.group) {
            continue;
        }

        let produced = run.process(ctx, target, records).await;
        let streak = streaks.entry(target.group.as_str()).or_insert(0);
        if produced > 0 {
            *streak = 0;
            continue;
        }

        *streak += 1;
        if *streak >= streak_limit {
            info!(
                source = %run.report.source,
                group = %target.group,
                streak = *streak,
                "Too many empty targets, skipping rest of group"
            );
            run.report.skipped_groups.push(target.group.clone());
        }
    }
}

async fn crawl_source(
    ctx: &RunContext,
    adapter: &dyn SiteAdapter,
    records: &mut RecordSet,
) -> SourceReport {
    let limit = ctx.config.max_records;
    let mut run = SourceRun::new(adapter, adapter.fetch_options(), limit);
    let source = adapter.source();
    info!(source = %source, limit, "Crawling source");

    let targets = match adapter.discover(&ctx.ladder, limit).await {
        Ok(targets) => targets,
        Err(e) => {
            error!(source = %source, "Discovery failed: {}", e);
            run.report.error = Some(e.to_string());
            return run.report;
        }
    };
    info!(source = %source, targets = targets.len(), "Discovered targets");

    run_targets(ctx, &mut run, &targets, records).await;

    info!(
        source = %source,
        records = run.report.records,
        new = run.report.new_records,
        empty = run.report.empty_targets,
        "Source done"
    );
    run.report
}

/// Count ids absent from `before`
fn count_new(records: &RecordSet, before: &HashSet<String>) -> usize {
    records.iter().filter(|r| !before.contains(&r.id)).count()
}

fn finish(
    ctx: &RunContext,
    records: &RecordSet,
    before: &HashSet<String>,
    sources: Vec<SourceReport>,
    force: bool,
) -> Result<RunReport> {
    let new_this_run = count_new(records, before);
    let guard = CommitGuard::new(force || ctx.config.force_commit);
    let (meta, verdict) = store::publish(ctx.store.as_ref(), records, new_this_run, guard)?;

    if verdict.is_pass() {
        info!(total = meta.total, new = new_this_run, "Commit guard: {}", verdict);
    } else {
        error!(total = meta.total, placeholders = meta.placeholder_count, "Commit guard: {}", verdict);
    }

    Ok(RunReport {
        sources,
        meta,
        verdict,
    })
}

/// Full crawl of every registered source
pub async fn crawl(ctx: &RunContext, force: bool) -> Result<RunReport> {
    let mut records = ctx.store.load()?;
    let before: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();

    let mut sources = Vec::new();
    for adapter in ctx.registry.iter() {
        sources.push(crawl_source(ctx, adapter, &mut records).await);
    }

    finish(ctx, &records, &before, sources, force)
}

/// Re-fetch records flagged `needs_recheck`, uncached
pub async fn recheck(ctx: &RunContext, force: bool) -> Result<RunReport> {
    let mut records = ctx.store.load()?;
    let before: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();

    let mut queue: BTreeMap<Source, Vec<Record>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.needs_recheck) {
        queue.entry(record.source).or_default().push(record.clone());
    }
    info!(
        queued = queue.values().map(Vec::len).sum::<usize>(),
        "Rechecking flagged records"
    );

    let mut sources = Vec::new();
    for (source, flagged) in &queue {
        let Some(adapter) = ctx.registry.get(*source) else {
            info!(source = %source, records = flagged.len(), "Source disabled, leaving flagged records");
            continue;
        };
        let targets: Vec<Target> = flagged
            .iter()
            .filter_map(|r| {
                let target = adapter.recheck_target(r);
                if target.is_none() {
                    info!(id = %r.id, "No recheck route, leaving for the next crawl");
                }
                target
            })
            .collect();
        if targets.is_empty() {
            continue;
        }

        let options = adapter.fetch_options().without_cache();
        let mut run = SourceRun::new(adapter, options, ctx.config.max_records);
        // One target per record; a streak of failures says nothing about the next
        for target in &targets {
            if run.is_full() {
                break;
            }
            run.process(ctx, target, &mut records).await;
        }
        sources.push(run.report);
    }

    finish(ctx, &records, &before, sources, force)
}

/// Re-evaluate the persisted dataset without fetching anything
pub fn check(ctx: &RunContext, force: bool) -> Result<(RunMeta, GuardVerdict)> {
    let loaded = ctx.store.load()?;
    let unreadable = loaded.unreadable().len();
    let records = loaded.into_records();
    let mut meta = RunMeta::compute(&records, 0);
    meta.total += unreadable;
    let verdict = CommitGuard::new(force || ctx.config.force_commit).evaluate(&meta);

    let report = ValidationReport::new(
        meta.clone(),
        &records,
        verdict.as_str().to_string(),
        verdict.is_pass(),
    );
    ctx.store.write_validation(&report)?;
    Ok((meta, verdict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AlbumdexError;
    use crate::config::{Config, RetryConfig};
    use crate::fetcher::{
        BlockClassifier, DebugArtifacts, FetchLadder, FetchTier, Pacer, ResponseCache, Tier,
        TierRequest, TierResponse,
    };
    use crate::sites::Registry;
    use crate::store::JsonStore;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    /// Answers every request with the requested URL
    struct EchoTier;

    #[async_trait]
    impl FetchTier for EchoTier {
        fn tier(&self) -> Tier {
            Tier::Direct
        }

        async fn attempt(&self, url: &str, _request: &TierRequest<'_>) -> Result<TierResponse> {
            Ok(TierResponse::new(200, url))
        }
    }

    /// (slug, group, titles) per listing page
    type Page = (&'static str, &'static str, Vec<&'static str>);

    struct FakeAdapter {
        source: Source,
        pages: Vec<Page>,
        fail_discover: bool,
        streak: usize,
    }

    impl FakeAdapter {
        fn new(source: Source, pages: Vec<Page>) -> Self {
            Self {
                source,
                pages,
                fail_discover: false,
                streak: 3,
            }
        }
    }

    #[async_trait]
    impl SiteAdapter for FakeAdapter {
        fn source(&self) -> Source {
            self.source
        }

        fn fetch_options(&self) -> FetchOptions {
            FetchOptions::json()
        }

        async fn discover(&self, _ladder: &FetchLadder, _limit: usize) -> Result<Vec<Target>> {
            if self.fail_discover {
                return Err(AlbumdexError::Other("listing down".into()));
            }
            Ok(self
                .pages
                .iter()
                .map(|(slug, group, _)| {
                    Target::new(format!("https://fake.test/{slug}"), *slug, *group)
                })
                .collect())
        }

        fn parse(&self, _content: &str, target: &Target) -> Result<Vec<Record>> {
            if let Some(site_id) = target.slug.strip_prefix("recheck-") {
                let mut record = Record::new(self.source, site_id, target.url.clone());
                record.title = "Recovered title".into();
                record.file_count = 4;
                return Ok(vec![record]);
            }
            let titles = self
                .pages
                .iter()
                .find(|(slug, _, _)| *slug == target.slug)
                .map(|(_, _, titles)| titles.clone())
                .unwrap_or_default();
            Ok(titles
                .into_iter()
                .enumerate()
                .map(|(i, title)| {
                    let site_id = format!("{}-{}", target.slug, i);
                    let url = format!("https://fake.test/a/{site_id}");
                    let mut record = Record::new(self.source, &site_id, url);
                    record.title = title.into();
                    record.file_count = 2;
                    record
                })
                .collect())
        }

        fn recheck_target(&self, record: &Record) -> Option<Target> {
            let id = record.site_id();
            Some(Target::new(
                format!("https://fake.test/recheck/{id}"),
                format!("recheck-{id}"),
                "recheck",
            ))
        }

        fn empty_streak_limit(&self) -> usize {
            self.streak
        }
    }

    fn context(dir: &Path, max_records: usize, adapters: Vec<Box<dyn SiteAdapter>>) -> RunContext {
        let mut config = Config::default();
        config.max_records = max_records;
        config.paths.output = dir.join("albums.json");
        config.paths.recheck = dir.join("recheck.json");
        config.paths.validation = dir.join("validation.json");

        let ladder = FetchLadder::new(
            vec![Box::new(EchoTier)],
            ResponseCache::disabled(),
            DebugArtifacts::new(dir.join("debug")),
            BlockClassifier::default(),
            Pacer::immediate(),
            RetryConfig::default(),
        );
        let store = Box::new(JsonStore::from_paths(&config.paths));
        RunContext::with_parts(config, ladder, store, Registry::with_adapters(adapters))
    }

    #[tokio::test]
    async fn test_crawl_publishes_and_counts_new() {
        let dir = TempDir::new().unwrap();
        let pages = vec![("p1", "latest", vec!["One", "Two"]), ("p2", "latest", vec!["Three"])];
        let ctx = context(
            dir.path(),
            100,
            vec![Box::new(FakeAdapter::new(Source::Erome, pages))],
        );

        let report = crawl(&ctx, false).await.unwrap();
        assert_eq!(report.meta.total, 3);
        assert_eq!(report.meta.new_this_run, 3);
        assert_eq!(report.verdict, GuardVerdict::Passed);
        assert_eq!(report.sources[0].targets, 2);
        assert_eq!(report.sources[0].new_records, 3);
        assert!(dir.path().join("albums.json").exists());
        assert!(dir.path().join("validation.json").exists());

        // A second run finds nothing new
        let again = crawl(&ctx, false).await.unwrap();
        assert_eq!(again.meta.total, 3);
        assert_eq!(again.meta.new_this_run, 0);
    }

    #[tokio::test]
    async fn test_max_records_caps_each_source() {
        let dir = TempDir::new().unwrap();
        let ctx = context(
            dir.path(),
            2,
            vec![
                Box::new(FakeAdapter::new(
                    Source::Erome,
                    vec![("p1", "g", vec!["A", "B", "C"]), ("p2", "g", vec!["D"])],
                )),
                Box::new(FakeAdapter::new(Source::Kemono, vec![("k1", "g", vec!["E", "F", "G"])])),
            ],
        );

        let report = crawl(&ctx, false).await.unwrap();
        assert_eq!(report.meta.total, 4);
        assert_eq!(report.sources[0].records, 2);
        assert_eq!(report.sources[0].targets, 1);
        assert_eq!(report.sources[1].records, 2);
    }

    #[tokio::test]
    async fn test_empty_streak_skips_rest_of_group() {
        let dir = TempDir::new().unwrap();
        let mut adapter = FakeAdapter::new(
            Source::Erome,
            vec![
                ("a1", "hot", vec![]),
                ("a2", "hot", vec![]),
                ("a3", "hot", vec!["Never fetched"]),
                ("b1", "new", vec!["Fresh"]),
            ],
        );
        adapter.streak = 2;
        let ctx = context(dir.path(), 100, vec![Box::new(adapter)]);

        let report = crawl(&ctx, false).await.unwrap();
        let source = &report.sources[0];
        assert_eq!(source.skipped_groups, vec!["hot".to_string()]);
        assert_eq!(source.targets, 3);
        assert_eq!(source.empty_targets, 2);
        assert_eq!(report.meta.total, 1);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        let mut broken = FakeAdapter::new(Source::Erome, vec![]);
        broken.fail_discover = true;
        let ctx = context(
            dir.path(),
            100,
            vec![
                Box::new(broken),
                Box::new(FakeAdapter::new(Source::Kemono, vec![("k1", "g", vec!["Post"])])),
            ],
        );

        let report = crawl(&ctx, false).await.unwrap();
        assert!(report.sources[0].error.as_deref().unwrap().contains("listing down"));
        assert_eq!(report.sources[1].records, 1);
        assert_eq!(report.meta.total, 1);
        assert!(report.passed());
    }

    #[tokio::test]
    async fn test_empty_crawl_is_refused_unless_forced() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), 100, vec![Box::new(FakeAdapter::new(Source::Erome, vec![]))]);

        assert_eq!(crawl(&ctx, false).await.unwrap().verdict, GuardVerdict::Empty);
        assert_eq!(crawl(&ctx, true).await.unwrap().verdict, GuardVerdict::Forced);
    }

    #[tokio::test]
    async fn test_recheck_upgrades_placeholder() {
        let dir = TempDir::new().unwrap();
        let pages = vec![("p1", "g", vec!["Just a moment...", "Real"])];
        let ctx = context(
            dir.path(),
            100,
            vec![Box::new(FakeAdapter::new(Source::Erome, pages))],
        );

        let first = crawl(&ctx, false).await.unwrap();
        assert_eq!(first.meta.placeholder_count, 1);
        assert_eq!(first.meta.recheck_count, 1);

        let report = recheck(&ctx, false).await.unwrap();
        assert_eq!(report.sources[0].targets, 1);
        assert_eq!(report.meta.placeholder_count, 0);
        assert_eq!(report.meta.new_this_run, 0);

        let records = ctx.store.load().unwrap();
        let fixed = records.get("erome:p1-0").unwrap();
        assert_eq!(fixed.title, "Recovered title");
        assert!(!fixed.needs_recheck);
        assert_eq!(fixed.file_count, 4);
    }

    #[tokio::test]
    async fn test_recheck_leaves_disabled_source_alone() {
        let dir = TempDir::new().unwrap();
        let pages = vec![("p1", "g", vec!["Just a moment...", "Real"])];
        let crawl_ctx = context(
            dir.path(),
            100,
            vec![Box::new(FakeAdapter::new(Source::Erome, pages))],
        );
        crawl(&crawl_ctx, false).await.unwrap();

        let kemono_only = context(
            dir.path(),
            100,
            vec![Box::new(FakeAdapter::new(Source::Kemono, vec![]))],
        );
        let report = recheck(&kemono_only, true).await.unwrap();
        assert!(report.sources.is_empty());
        assert_eq!(report.meta.recheck_count, 1);
        assert!(kemono_only.store.load().unwrap().get("erome:p1-0").unwrap().needs_recheck);
    }

    #[tokio::test]
    async fn test_check_evaluates_without_fetching() {
        let dir = TempDir::new().unwrap();
        let pages = vec![("p1", "g", vec!["Kept"])];
        let ctx = context(
            dir.path(),
            100,
            vec![Box::new(FakeAdapter::new(Source::Erome, pages))],
        );
        crawl(&ctx, false).await.unwrap();
        std::fs::remove_file(dir.path().join("validation.json")).unwrap();

        let (meta, verdict) = check(&ctx, false).unwrap();
        assert_eq!(meta.total, 1);
        assert_eq!(meta.new_this_run, 0);
        assert_eq!(verdict, GuardVerdict::Passed);
        assert!(dir.path().join("validation.json").exists());
    }
}
