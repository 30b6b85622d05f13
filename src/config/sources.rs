use serde::{Deserialize, Serialize};

use crate::domain::Source;

/// Per-source toggles and source-specific knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub eporner: bool,
    pub erome: bool,
    pub fapello: bool,
    pub kemono: bool,
    pub bunkr: bool,
    pub cyberdrop: bool,

    /// Pages of the fapello "new" feed to walk (default: 30)
    pub fapello_max_pages: u32,
    /// Pages of the bunkr-albums.io directory to walk (default: 8)
    pub bunkr_max_pages: u32,
    /// Cyberdrop album ids to index; the site has no public directory
    pub cyberdrop_albums: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            eporner: true,
            erome: true,
            fapello: true,
            kemono: true,
            bunkr: true,
            cyberdrop: true,
            fapello_max_pages: 30,
            bunkr_max_pages: 8,
            cyberdrop_albums: Vec::new(),
        }
    }
}

impl SourcesConfig {
    pub fn is_enabled(&self, source: Source) -> bool {
        match source {
            Source::Eporner => self.eporner,
            Source::Erome => self.erome,
            Source::Fapello => self.fapello,
            Source::Kemono => self.kemono,
            Source::Bunkr => self.bunkr,
            Source::Cyberdrop => self.cyberdrop,
        }
    }

    pub fn set_enabled(&mut self, source: Source, enabled: bool) {
        match source {
            Source::Eporner => self.eporner = enabled,
            Source::Erome => self.erome = enabled,
            Source::Fapello => self.fapello = enabled,
            Source::Kemono => self.kemono = enabled,
            Source::Bunkr => self.bunkr = enabled,
            Source::Cyberdrop => self.cyberdrop = enabled,
        }
    }

    /// Enabled sources in crawl order
    pub fn enabled(&self) -> Vec<Source> {
        Source::ALL
            .into_iter()
            .filter(|s| self.is_enabled(*s))
            .collect()
    }

    /// Restrict the run to exactly `only`
    pub fn restrict_to(&mut self, only: &[Source]) {
        for source in Source::ALL {
            self.set_enabled(source, only.contains(&source));
        }
    }
}
