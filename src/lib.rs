//! # Albumdex
//!
//! An album metadata indexer: crawls several content sites, normalizes what
//! it finds into one record shape, merges it into a persistent collection and
//! refuses to publish a dataset that looks broken.
//!
//! ## Architecture
//!
//! ```text
//! Sites → FetchLadder → parse → Normalizer → RecordSet → Store + CommitGuard
//!            │
//!            cache → Direct → Challenge → Browser
//! ```
//!
//! - [`sites`]: One adapter per source, discovering targets and parsing pages
//! - [`fetcher`]: Tiered fetching with caching, pacing and block detection
//! - [`normalizer`]: Record validation and the merge engine
//! - [`store`]: JSON persistence and the commit guard
//!
//! ## Quick Start
//!
//! ```bash
//! # Crawl every enabled source
//! albumdex crawl
//!
//! # Crawl two sources, at most 100 records each, bypassing the cache
//! albumdex crawl -s erome -s kemono -m 100 --no-cache
//!
//! # Re-fetch records flagged for recheck
//! albumdex recheck
//!
//! # Re-run the commit guard against the published dataset
//! albumdex check
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Run context and error types
//! - [`browser`]: Headless Chrome tier, stealth script and cookie persistence
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: TOML configuration with environment overrides
//! - [`domain`]: Core models (Record, Source, RunMeta)
//! - [`pipeline`]: The crawl, recheck and check runs

/// Run context and error handling.
///
/// The [`RunContext`](app::RunContext) struct wires together all components:
/// ladder, store, adapter registry, normalizer.
pub mod app;

/// The browser tier of the fetch ladder.
///
/// - [`BrowserTier`](browser::BrowserTier): chromiumoxide-driven Chrome, launched lazily
/// - [`SessionState`](browser::SessionState): cookies persisted between runs
/// - [`stealth`](browser::stealth): automation-masking script injected into every page
pub mod browser;

/// Command-line interface using clap.
///
/// - `crawl [--force] [--no-cache] [-m N] [-s SOURCE]...` - Crawl and publish
/// - `recheck [--force]` - Re-fetch flagged records
/// - `check [--force]` - Run the commit guard only
/// - `list [--recheck] [-s SOURCE] [-l N]` - Show indexed records
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/albumdex/config.toml`, then applies environment
/// overrides such as `MAX_RECORDS`, `ENABLE_<SOURCE>` and `DEBUG_NO_CACHE`.
pub mod config;

/// Core domain models.
///
/// - [`Record`](domain::Record): One album, post, video or model profile
/// - [`Source`](domain::Source): The sites the indexer knows
/// - [`RunMeta`](domain::RunMeta): Dataset summary written with every publish
pub mod domain;

/// Tiered fetching.
///
/// - [`FetchLadder`](fetcher::FetchLadder): Escalating fetch with retries and caching
/// - [`FetchTier`](fetcher::FetchTier): Async trait for a single rung
/// - [`DirectTier`](fetcher::DirectTier): reqwest-based plain request
/// - [`ChallengeTier`](fetcher::ChallengeTier): Cookie-carrying client that solves script challenges and follows refreshes
pub mod fetcher;

/// Record validation and merging.
///
/// Validates ids and URLs, cleans titles and folds records into a
/// [`RecordSet`](normalizer::RecordSet) without ever losing information.
pub mod normalizer;

/// Sequential crawl, recheck and check runs.
pub mod pipeline;

/// Site adapters behind the [`SiteAdapter`](sites::SiteAdapter) trait.
pub mod sites;

/// Persistence.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`JsonStore`](store::JsonStore): Atomic JSON file implementation
/// - [`CommitGuard`](store::CommitGuard): Data-quality gate
pub mod store;
