use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use albumdex::app::RunContext;
use albumdex::cli::{commands, Cli, Commands};
use albumdex::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "albumdex=debug" } else { "albumdex=info" };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.apply_env(std::env::vars())?;

    match &cli.command {
        Commands::Crawl {
            force,
            no_cache,
            max_records,
            sources,
        } => {
            config.force_commit |= *force;
            config.fetch.no_cache |= *no_cache;
            if let Some(max) = max_records {
                config.max_records = *max;
            }
            if !sources.is_empty() {
                config.sources.restrict_to(sources);
            }
        }
        Commands::Recheck { force, sources } => {
            config.force_commit |= *force;
            if !sources.is_empty() {
                config.sources.restrict_to(sources);
            }
        }
        Commands::Check { force } => config.force_commit |= *force,
        Commands::List { .. } => {}
    }

    let ctx = RunContext::new(config)?;

    let result = match cli.command {
        Commands::Crawl { .. } => commands::crawl(&ctx, false).await,
        Commands::Recheck { .. } => commands::recheck(&ctx, false).await,
        Commands::Check { .. } => commands::check(&ctx, false),
        Commands::List {
            recheck,
            source,
            limit,
        } => commands::list_records(&ctx, recheck, source, limit).map(|()| true),
    };

    // The browser must go down whether or not the run succeeded
    ctx.shutdown().await;

    if result? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
