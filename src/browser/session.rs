//! Browser cookie persistence between runs.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use chromiumoxide::cdp::browser_protocol::network::{Cookie, CookieParam};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::{AlbumdexError, Result};

/// A cookie as written to the storage-state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix seconds; non-positive means a session cookie
    #[serde(default = "session_expiry")]
    pub expires: f64,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_path() -> String {
    "/".to_string()
}

fn session_expiry() -> f64 {
    -1.0
}

impl StoredCookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires > 0.0 && self.expires <= now.timestamp() as f64
    }

    pub fn to_param(&self) -> Option<CookieParam> {
        CookieParam::builder()
            .name(self.name.clone())
            .value(self.value.clone())
            .domain(self.domain.clone())
            .path(self.path.clone())
            .secure(self.secure)
            .http_only(self.http_only)
            .build()
            .ok()
    }
}

impl From<&Cookie> for StoredCookie {
    fn from(cookie: &Cookie) -> Self {
        Self {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain: cookie.domain.clone(),
            path: cookie.path.clone(),
            expires: cookie.expires,
            secure: cookie.secure,
            http_only: cookie.http_only,
        }
    }
}

/// Contents of the storage-state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
}

impl SessionState {
    pub fn new(cookies: Vec<StoredCookie>) -> Self {
        Self {
            saved_at: Utc::now(),
            cookies,
        }
    }

    /// Load the stored state, dropping cookies that expired by `now`.
    /// A missing or unreadable file yields an empty state.
    pub fn load(path: &Path, now: DateTime<Utc>) -> Self {
        let mut state = match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<SessionState>(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), "Ignoring corrupt browser state: {}", e);
                    Self::new(Vec::new())
                }
            },
            Err(_) => Self::new(Vec::new()),
        };

        let before = state.cookies.len();
        state.cookies.retain(|c| !c.is_expired(now));
        if state.cookies.len() < before {
            debug!(dropped = before - state.cookies.len(), "Dropped expired cookies");
        }
        state
    }

    /// Write the state via a temporary file in the same directory
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path).map_err(|e| {
            AlbumdexError::Browser(format!(
                "Failed to persist browser state to {}: {}",
                path.display(),
                e
            ))
        })
    }
}
