use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RestyleError, Result};
use crate::guard::GuardConfig;
use crate::normalizer::NormalizerConfig;
use crate::quality::QualityConfig;

/// Settings for the three text components. Every table is optional in TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RestyleConfig {
    pub guard: GuardConfig,
    pub normalizer: NormalizerConfig,
    pub quality: QualityConfig,
}

impl RestyleConfig {
    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config not found, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents).map_err(|source| RestyleError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }
}
