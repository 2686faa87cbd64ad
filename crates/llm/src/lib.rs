use std::env;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{header::HeaderValue, Client};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

mod error;
mod retry;

pub use error::GenerationError;
pub use retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Deepseek,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Deepseek => "deepseek",
            LlmProvider::Local => "local",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "deepseek" => Some(LlmProvider::Deepseek),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Deepseek => "https://api.deepseek.com/v1",
            LlmProvider::Local => "",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// External text generation. One call, no retries; wrap with [`RetryPolicy::run`].
pub trait Generator: Send + Sync {
    fn generate<'a>(&'a self, req: &'a LlmRequest)
        -> BoxFuture<'a, Result<LlmResponse, GenerationError>>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    remote: Option<RemoteConfig>,
}

#[derive(Clone)]
struct RemoteConfig {
    api_key: String,
    base_url: String,
}

impl LlmClient {
    /// Reads the provider's API key and base URL from the environment.
    pub fn new(
        provider: LlmProvider,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let remote = match provider {
            LlmProvider::OpenAi => Some(RemoteConfig {
                api_key: read_api_key("OPENAI_API_KEY")?,
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| provider.default_base_url().to_string()),
            }),
            LlmProvider::Deepseek => Some(RemoteConfig {
                api_key: read_api_key("DEEPSEEK_API_KEY")?,
                base_url: env::var("DEEPSEEK_BASE_URL")
                    .unwrap_or_else(|_| provider.default_base_url().to_string()),
            }),
            LlmProvider::Local => None,
        };
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Config(e.to_string()))?;
        Ok(Self {
            http,
            provider,
            model: model.into(),
            remote,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse, GenerationError> {
        match &self.remote {
            Some(cfg) => self.chat_completions(cfg, req).await,
            None => Ok(self.chat_local(req)),
        }
    }

    async fn chat_completions(
        &self,
        cfg: &RemoteConfig,
        req: &LlmRequest,
    ) -> Result<LlmResponse, GenerationError> {
        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": req.user }));
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(temperature) = req.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = req.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        let response = self
            .http
            .post(&url)
            .bearer_auth(&cfg.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers().get("retry-after"));
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::from_status(status.as_u16(), body, retry_after));
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Malformed(format!("invalid JSON: {e}")))?;
        let content = extract_openai_text(&value)
            .ok_or_else(|| GenerationError::Malformed("missing text in response".to_string()))?;
        let usage: ChatUsage = value
            .get("usage")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        debug!(
            provider = self.provider.as_str(),
            model = %self.model,
            prompt_tokens = usage.prompt_tokens.unwrap_or(0),
            "generation completed"
        );
        Ok(LlmResponse {
            content,
            prompt_tokens: usage.prompt_tokens.unwrap_or(0),
            completion_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }

    fn chat_local(&self, req: &LlmRequest) -> LlmResponse {
        LlmResponse {
            content: synthesize_local_response(req),
            prompt_tokens: 0,
            completion_tokens: 0,
        }
    }
}

impl Generator for LlmClient {
    fn generate<'a>(
        &'a self,
        req: &'a LlmRequest,
    ) -> BoxFuture<'a, Result<LlmResponse, GenerationError>> {
        self.chat(req).boxed()
    }
}

fn parse_retry_after(value: Option<&HeaderValue>) -> Option<Duration> {
    let secs = value?.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.max(1)))
}

/// Marker lines that delimit the source article inside a rewrite prompt.
pub const SOURCE_START: &str = "【原文】";
pub const SOURCE_END: &str = "【输出要求】";

/// Offline stand-in that echoes the source article in the sectioned output
/// format: first clause as title, first sentence as lead, full text as body.
fn synthesize_local_response(req: &LlmRequest) -> String {
    let source = extract_context_block(&req.user, SOURCE_START, SOURCE_END);
    let title = source
        .split(['，', '。', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or("");
    let lead = match source.find('。') {
        Some(idx) => &source[..idx + '。'.len_utf8()],
        None => source.as_str(),
    };
    format!(
        "===标题===\n{title}\n===导语===\n{}\n===正文===\n{source}\n===风格说明===\n本地模式，未调用外部模型\n",
        lead.trim()
    )
}

fn extract_context_block(text: &str, start_marker: &str, stop_marker: &str) -> String {
    if let Some(start_idx) = text.find(start_marker) {
        let after = &text[start_idx + start_marker.len()..];
        if let Some(end_idx) = after.find(stop_marker) {
            return after[..end_idx].trim().to_string();
        }
        return after.trim().to_string();
    }
    text.trim().to_string()
}

fn read_api_key(var: &str) -> Result<String, GenerationError> {
    let value = env::var(var).map_err(|_| GenerationError::Config(format!("{var} is not set")))?;
    if !value.starts_with("sk-") {
        return Err(GenerationError::Config(format!("{var} must start with 'sk-'")));
    }
    Ok(value)
}

fn extract_openai_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    if let Some(text) = choice.get("text").and_then(|t| t.as_str()) {
        return Some(text.to_string());
    }
    let content = choice.get("message")?.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    content
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(|t| t.as_str()))
        .map(str::to_string)
}

#[derive(Default, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_roundtrip() {
        for provider in [LlmProvider::OpenAi, LlmProvider::Deepseek, LlmProvider::Local] {
            assert_eq!(LlmProvider::parse(provider.as_str()), Some(provider));
        }
        assert_eq!(LlmProvider::parse("DeepSeek"), Some(LlmProvider::Deepseek));
        assert_eq!(LlmProvider::parse("gemini"), None);
    }

    #[test]
    fn extracts_chat_completion_text() {
        let value = json!({"choices": [{"message": {"content": "===标题===\n甲"}}]});
        assert_eq!(extract_openai_text(&value).as_deref(), Some("===标题===\n甲"));
        let parts = json!({"choices": [{"message": {"content": [{"type": "text", "text": "乙"}]}}]});
        assert_eq!(extract_openai_text(&parts).as_deref(), Some("乙"));
        assert!(extract_openai_text(&json!({"choices": []})).is_none());
    }

    #[test]
    fn retry_after_header_is_seconds() {
        let value = HeaderValue::from_static("7");
        assert_eq!(parse_retry_after(Some(&value)), Some(Duration::from_secs(7)));
        let bogus = HeaderValue::from_static("soon");
        assert_eq!(parse_retry_after(Some(&bogus)), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn local_provider_echoes_source_sections() {
        let req = LlmRequest {
            user: format!(
                "示例略\n{SOURCE_START}\n{{{{DATE_1}}}}，某局投入{{{{NUM_1}}}}。改造完成。\n{SOURCE_END}\n格式"
            ),
            ..LlmRequest::default()
        };
        let text = synthesize_local_response(&req);
        assert!(text.starts_with("===标题===\n{{DATE_1}}\n"));
        assert!(text.contains("===导语===\n{{DATE_1}}，某局投入{{NUM_1}}。\n"));
        assert!(text.contains("===正文===\n{{DATE_1}}，某局投入{{NUM_1}}。改造完成。\n"));
    }

    #[tokio::test]
    async fn local_client_needs_no_key() {
        let client = LlmClient::new(LlmProvider::Local, "local", Duration::from_secs(5)).unwrap();
        let req = LlmRequest {
            user: format!("{SOURCE_START}\n测试文本。\n{SOURCE_END}"),
            ..LlmRequest::default()
        };
        let response = client.generate(&req).await.unwrap();
        assert!(response.content.contains("===正文===\n测试文本。"));
        assert_eq!(response.total_tokens(), 0);
    }
}
