use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestyleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, RestyleError>;
