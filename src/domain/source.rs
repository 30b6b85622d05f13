use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::app::AlbumdexError;

/// A content site the indexer knows how to crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Bunkr,
    Cyberdrop,
    Eporner,
    Erome,
    Fapello,
    Kemono,
}

impl Source {
    /// All sources in crawl order
    pub const ALL: [Source; 6] = [
        Source::Eporner,
        Source::Kemono,
        Source::Erome,
        Source::Fapello,
        Source::Bunkr,
        Source::Cyberdrop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bunkr => "bunkr",
            Self::Cyberdrop => "cyberdrop",
            Self::Eporner => "eporner",
            Self::Erome => "erome",
            Self::Fapello => "fapello",
            Self::Kemono => "kemono",
        }
    }

    /// Build the canonical record id for a site-specific identifier
    pub fn record_id(&self, site_id: &str) -> String {
        format!("{}:{}", self.as_str(), site_id)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = AlbumdexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bunkr" => Ok(Self::Bunkr),
            "cyberdrop" => Ok(Self::Cyberdrop),
            "eporner" => Ok(Self::Eporner),
            "erome" => Ok(Self::Erome),
            "fapello" => Ok(Self::Fapello),
            "kemono" => Ok(Self::Kemono),
            other => Err(AlbumdexError::UnknownSource(other.to_string())),
        }
    }
}
