use std::fs;
use std::path::PathBuf;

use tracing::warn;

/// Longest sanitized slug used as a file name
const MAX_SLUG_LEN: usize = 80;

/// Stores raw bodies of blocked responses under `<dir>/<site>/<slug>.html`
/// for post-hoc diagnosis.
#[derive(Debug, Clone)]
pub struct DebugArtifacts {
    dir: PathBuf,
}

impl DebugArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Lower-case, `[a-z0-9_-]` only, bounded length
    pub fn sanitize(slug: &str) -> String {
        let safe: String = slug
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_SLUG_LEN)
            .collect();
        if safe.is_empty() {
            "_".to_string()
        } else {
            safe
        }
    }

    pub fn path_for(&self, site: &str, slug: &str) -> PathBuf {
        self.dir
            .join(Self::sanitize(site))
            .join(format!("{}.html", Self::sanitize(slug)))
    }

    /// Write the artifact, returning its path. Failures are logged, never raised.
    pub fn save(&self, site: &str, slug: &str, content: &str) -> Option<PathBuf> {
        let path = self.path_for(site, slug);
        let result = path
            .parent()
            .map(fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| fs::write(&path, content));

        match result {
            Ok(()) => {
                warn!(site, slug, path = %path.display(), "Saved blocked response");
                Some(path)
            }
            Err(e) => {
                warn!(site, slug, "Failed to save debug artifact: {}", e);
                None
            }
        }
    }
}
