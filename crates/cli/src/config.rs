use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use restyle_core::RestyleConfig;
use restyle_index::RetrieverConfig;
use restyle_llm::{LlmProvider, RetryPolicy};

pub const DEFAULT_CONFIG: &str = "restyle.toml";

const SECTIONS: &[&str] = &["guard", "normalizer", "quality", "retriever", "retry", "llm"];

/// Core tables come from [`RestyleConfig::load`]; the client tables are read here.
#[derive(Debug, Default)]
pub struct AppConfig {
    pub engine: RestyleConfig,
    pub retriever: RetrieverConfig,
    pub retry: RetryPolicy,
    pub llm: LlmSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ClientSections {
    retriever: RetrieverConfig,
    retry: RetryPolicy,
    llm: LlmSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Local,
            model: "deepseek-chat".to_string(),
            timeout_secs: 60,
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

/// Missing file yields defaults; a file that exists but does not parse is an error.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let engine = RestyleConfig::load(path)?;
    if !path.exists() {
        return Ok(AppConfig {
            engine,
            ..AppConfig::default()
        });
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let sections = parse_sections(&contents).with_context(|| format!("in {}", path.display()))?;
    info!(provider = sections.llm.provider.as_str(), "loaded client config");
    Ok(AppConfig {
        engine,
        retriever: sections.retriever,
        retry: sections.retry,
        llm: sections.llm,
    })
}

fn parse_sections(contents: &str) -> Result<ClientSections> {
    let table: toml::Table = contents
        .parse()
        .map_err(|e| anyhow!("invalid config: {e}"))?;
    for section in SECTIONS {
        if !table.contains_key(*section) {
            warn!(section, "config section missing, using defaults");
        }
    }
    toml::from_str(contents).map_err(|e| anyhow!("invalid config: {e}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use restyle_core::{QualityConfig, RestyleError};

    use super::*;

    #[test]
    fn sections_map_onto_components() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[guard]
org_whitelist = ["某局"]

[retriever]
top_k = 5
tokenizer = "words"

[retry]
max_attempts = 1

[llm]
provider = "deepseek"
"#
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.engine.guard.org_whitelist, vec!["某局"]);
        assert_eq!(config.retriever.top_k, 5);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.llm.provider, LlmProvider::Deepseek);
        assert_eq!(config.llm.max_tokens, 2000);
        assert_eq!(config.engine.quality, QualityConfig::default());
    }

    #[test]
    fn missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.llm.provider, LlmProvider::Local);
        assert_eq!(config.retriever, RetrieverConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[retriever\ntop_k = ").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RestyleError>(),
            Some(RestyleError::Config { .. })
        ));
    }
}
