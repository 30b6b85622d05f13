use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum AlbumdexError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Challenge script failed: {0}")]
    Script(String),

    #[error("Invalid record {id}: {reason}")]
    Validation { id: String, reason: String },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AlbumdexError>;
