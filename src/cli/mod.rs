pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::Source;

#[derive(Parser)]
#[command(name = "albumdex")]
#[command(about = "Index album metadata from several content sites", long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (default: ~/.config/albumdex/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl every enabled source and publish the dataset
    Crawl {
        /// Publish even if the commit guard refuses
        #[arg(long)]
        force: bool,

        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,

        /// Cap on records per source
        #[arg(short, long)]
        max_records: Option<usize>,

        /// Only crawl these sources (repeatable)
        #[arg(short, long = "source")]
        sources: Vec<Source>,
    },
    /// Re-fetch records flagged for recheck
    Recheck {
        /// Publish even if the commit guard refuses
        #[arg(long)]
        force: bool,

        /// Only recheck these sources (repeatable)
        #[arg(short, long = "source")]
        sources: Vec<Source>,
    },
    /// Run the commit guard against the published dataset
    Check {
        /// Report a refused guard as forced
        #[arg(long)]
        force: bool,
    },
    /// List indexed records
    List {
        /// Only records flagged for recheck
        #[arg(long)]
        recheck: bool,

        /// Only records from this source
        #[arg(short, long)]
        source: Option<Source>,

        /// Show at most this many records
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crawl_flags() {
        let cli = Cli::parse_from([
            "albumdex", "crawl", "--force", "--no-cache", "-m", "20", "--source", "erome", "-s",
            "kemono",
        ]);
        match cli.command {
            Commands::Crawl {
                force,
                no_cache,
                max_records,
                sources,
            } => {
                assert!(force);
                assert!(no_cache);
                assert_eq!(max_records, Some(20));
                assert_eq!(sources, vec![Source::Erome, Source::Kemono]);
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["albumdex", "list", "--recheck", "-v", "--config", "x.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::List { recheck: true, limit: 50, .. }));
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        assert!(Cli::try_parse_from(["albumdex", "crawl", "--source", "nowhere"]).is_err());
    }
}
