//! Configuration management for albumdex.
//!
//! Configuration is read from `~/.config/albumdex/config.toml` (or an explicit
//! path), then overridden by environment variables, then by CLI flags.
//! If the default file doesn't exist, a commented default is created.

pub mod fetch;
pub mod sources;

pub use fetch::{FetchConfig, RetryConfig};
pub use sources::SourcesConfig;

use crate::browser::BrowserConfig;
use crate::domain::Source;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Longest politeness delay accepted, in seconds
const MAX_DELAY_SECS: f64 = 3600.0;

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cap on distinct records each source contributes per run
    pub max_records: usize,
    /// Publish even when the commit guard would refuse
    pub force_commit: bool,
    pub paths: PathsConfig,
    pub fetch: FetchConfig,
    pub browser: BrowserConfig,
    pub sources: SourcesConfig,
}

/// Locations of every file the indexer reads or writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output: PathBuf,
    pub recheck: PathBuf,
    pub validation: PathBuf,
    pub cache_dir: PathBuf,
    pub debug_dir: PathBuf,
    pub browser_state: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("albums.json"),
            recheck: PathBuf::from("recheck.json"),
            validation: PathBuf::from("validation.json"),
            cache_dir: PathBuf::from("cache"),
            debug_dir: PathBuf::from("debug"),
            browser_state: PathBuf::from("browser_storage_state.json"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_records: 500,
            force_commit: false,
            paths: PathsConfig::default(),
            fetch: FetchConfig::default(),
            browser: BrowserConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl Config {
    /// Load `~/.config/albumdex/config.toml`, writing a commented default
    /// there first if it is missing. Absent keys take their defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_config_path()?;
        if path.exists() {
            return Self::load_from(&path);
        }

        Self::create_default_config(&path)?;
        Ok(Self::default())
    }

    /// Load configuration from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(io_error(path))?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path: `~/.config/albumdex/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("albumdex").join("config.toml"))
    }

    /// Apply environment-style overrides.
    ///
    /// Recognized keys (case-insensitive): `MAX_RECORDS`/`MAX_ALBUMS`,
    /// `ENABLE_<SOURCE>`, `DELAY_MIN`, `DELAY_MAX`, `CACHE_TTL`, `CACHE_DIR`,
    /// `DEBUG_NO_CACHE`, `FORCE_COMMIT`, `FAPELLO_MAX_PAGES`, `BUNKR_MAX_PAGES`,
    /// `CYBERDROP_ALBUMS` (comma separated). Unknown keys are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let key = key.to_uppercase();
            match key.as_str() {
                "MAX_RECORDS" | "MAX_ALBUMS" => self.max_records = parse_env(&key, &value)?,
                "DELAY_MIN" => self.fetch.delay_min_secs = parse_env(&key, &value)?,
                "DELAY_MAX" => self.fetch.delay_max_secs = parse_env(&key, &value)?,
                "CACHE_TTL" => self.fetch.cache_ttl_secs = parse_env(&key, &value)?,
                "CACHE_DIR" => self.paths.cache_dir = PathBuf::from(value),
                "DEBUG_NO_CACHE" => self.fetch.no_cache = parse_bool(&key, &value)?,
                "FORCE_COMMIT" => self.force_commit = parse_bool(&key, &value)?,
                "FAPELLO_MAX_PAGES" => {
                    self.sources.fapello_max_pages = parse_env(&key, &value)?
                }
                "BUNKR_MAX_PAGES" => self.sources.bunkr_max_pages = parse_env(&key, &value)?,
                "CYBERDROP_ALBUMS" => {
                    self.sources.cyberdrop_albums = value
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                }
                _ => {
                    if let Some(name) = key.strip_prefix("ENABLE_") {
                        if let Ok(source) = name.parse::<Source>() {
                            let enabled = parse_bool(&key, &value)?;
                            self.sources.set_enabled(source, enabled);
                        }
                    }
                }
            }
        }

        self.validate()
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fetch = &self.fetch;
        for (key, value) in [
            ("delay_min", fetch.delay_min_secs),
            ("delay_max", fetch.delay_max_secs),
        ] {
            if !value.is_finite() || value > MAX_DELAY_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{key} must be a number of seconds no larger than {MAX_DELAY_SECS}, got {value}"
                )));
            }
        }
        if !(fetch.delay_min_secs >= 0.0 && fetch.delay_max_secs >= fetch.delay_min_secs) {
            return Err(ConfigError::Invalid(format!(
                "delay bounds must satisfy 0 <= delay_min ({}) <= delay_max ({})",
                fetch.delay_min_secs, fetch.delay_max_secs
            )));
        }
        Ok(())
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        fs::File::create(path)
            .and_then(|mut file| file.write_all(Self::default_config_content().as_bytes()))
            .map_err(io_error(path))
    }

    /// Commented TOML written on first run
    fn default_config_content() -> String {
        r##"# albumdex configuration
#
# Every value can also be overridden from the environment:
#   MAX_RECORDS, ENABLE_<SOURCE>, DELAY_MIN, DELAY_MAX, CACHE_TTL,
#   CACHE_DIR, DEBUG_NO_CACHE, FORCE_COMMIT, FAPELLO_MAX_PAGES,
#   BUNKR_MAX_PAGES, CYBERDROP_ALBUMS

# Distinct records each source may contribute per run
max_records = 500

# Publish even when the quality gate fails
force_commit = false

[paths]
output = "albums.json"
recheck = "recheck.json"
validation = "validation.json"
cache_dir = "cache"
debug_dir = "debug"
browser_state = "browser_storage_state.json"

[fetch]
# Randomized politeness delay before every live request (seconds)
delay_min_secs = 1.5
delay_max_secs = 3.0

# Cached responses younger than this are reused (seconds)
cache_ttl_secs = 21600
no_cache = false

direct_timeout_secs = 25
challenge_timeout_secs = 35
challenge_max_wait_secs = 10

# Sleep after HTTP 429 (seconds) and exponential backoff base (milliseconds)
rate_limit_backoff_secs = 30
backoff_base_ms = 1000

# Shorter responses are treated as block pages
min_content_bytes = 3000

[fetch.retries]
direct = 3
challenge = 3
browser = 1

[browser]
enabled = true
headless = true
timeout_secs = 45
wait_after_load_ms = 3000
challenge_wait_secs = 15
languages = ["en-US", "en"]
window_size = [1920, 1080]

[sources]
eporner = true
erome = true
fapello = true
kemono = true
bunkr = true
cyberdrop = true
fapello_max_pages = 30
bunkr_max_pages = 8
# Cyberdrop has no directory; list the album ids to index
cyberdrop_albums = []
"##
        .to_string()
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Env {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    Env { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.max_records, 500);
        assert_eq!(config.fetch.cache_ttl_secs, 21600);
        assert_eq!(config.browser.window_size, (1920, 1080));
        assert_eq!(config.sources.fapello_max_pages, 30);
        assert_eq!(config.paths.output, PathBuf::from("albums.json"));
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
max_records = 50

[sources]
kemono = false
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.max_records, 50);
        assert!(!config.sources.kemono);
        // Default value
        assert!(config.sources.erome);
        assert_eq!(config.fetch.delay_max_secs, 3.0);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.max_records, 500);
        assert!(!config.force_commit);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "force_commit = true\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.force_commit);
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load_from(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_from_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_records = \"many\"\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("MAX_ALBUMS", "25"),
                ("delay_min", "0"),
                ("DELAY_MAX", "0.5"),
                ("CACHE_TTL", "60"),
                ("CACHE_DIR", "/tmp/albumdex-cache"),
                ("DEBUG_NO_CACHE", "true"),
                ("FORCE_COMMIT", "yes"),
                ("ENABLE_KEMONO", "false"),
                ("ENABLE_BUNKR", "false"),
                ("ENABLE_CYBERFILE", "true"),
                ("CYBERDROP_ALBUMS", "AbCd1234, xYz98765,,"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();

        assert_eq!(config.max_records, 25);
        assert_eq!(config.fetch.delay_min_secs, 0.0);
        assert_eq!(config.fetch.delay_max_secs, 0.5);
        assert_eq!(config.fetch.cache_ttl_secs, 60);
        assert_eq!(config.paths.cache_dir, PathBuf::from("/tmp/albumdex-cache"));
        assert!(config.fetch.no_cache);
        assert!(config.force_commit);
        assert!(!config.sources.kemono);
        assert!(!config.sources.bunkr);
        assert!(config.sources.erome);
        assert_eq!(config.sources.cyberdrop_albums, vec!["AbCd1234", "xYz98765"]);
    }

    #[test]
    fn test_apply_env_rejects_garbage() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("FORCE_COMMIT", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref key, .. } if key == "FORCE_COMMIT"));

        let err = config.apply_env(env(&[("MAX_RECORDS", "-3")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_unbounded_delays_rejected() {
        for (key, value) in [
            ("DELAY_MAX", "inf"),
            ("DELAY_MAX", "1e30"),
            ("DELAY_MIN", "NaN"),
            ("DELAY_MAX", "3601"),
        ] {
            let mut config = Config::default();
            let result = config.apply_env(env(&[(key, value)]));
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "{key}={value} accepted"
            );
        }

        let mut config = Config::default();
        config.apply_env(env(&[("DELAY_MAX", "3600")])).unwrap();
        assert_eq!(config.fetch.delay_max_secs, 3600.0);
    }

    #[test]
    fn test_infinite_delay_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[fetch]\ndelay_max_secs = inf\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_inverted_delay_bounds_rejected() {
        let mut config = Config::default();
        let result = config.apply_env(env(&[("DELAY_MIN", "5"), ("DELAY_MAX", "1")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
