//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    secrets::ApiKey, Completion, CompletionConfig, CompletionRequest, LlmProvider, ProviderError,
    TokenUsage,
};

pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug)]
pub struct AnthropicProvider {
    key: ApiKey,
    endpoint: String,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(key: ApiKey) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            key,
            endpoint: MESSAGES_URL.to_string(),
            http,
        })
    }

    /// Key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(ApiKey::from_env(ANTHROPIC_API_KEY_ENV)?)
    }

    /// Point at a proxy or test server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    system: [SystemBlock<'a>; 1],
    messages: [UserTurn<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct SystemBlock<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<Ephemeral>,
}

#[derive(Debug, Serialize)]
struct Ephemeral {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct UserTurn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    content: Vec<ReplyBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: ReplyUsage,
}

#[derive(Debug, Deserialize)]
struct ReplyBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn body<'a>(request: &'a CompletionRequest, config: &'a CompletionConfig) -> MessagesBody<'a> {
    MessagesBody {
        model: &config.model,
        max_tokens: config.max_tokens,
        system: [SystemBlock {
            kind: "text",
            text: &request.system,
            cache_control: config
                .cache_system_prompt
                .then_some(Ephemeral { kind: "ephemeral" }),
        }],
        messages: [UserTurn {
            role: "user",
            content: &request.user,
        }],
        temperature: (config.temperature > 0.0).then_some(config.temperature),
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
        config: &CompletionConfig,
    ) -> Result<Completion, ProviderError> {
        tracing::debug!(role = %request.role, model = %config.model, chars = request.prompt_len(), "Anthropic request");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", self.key.reveal())
            .header("anthropic-version", API_VERSION)
            .timeout(config.timeout)
            .json(&body(request, config))
            .send()
            .await
            .map_err(|e| match e.is_timeout() {
                true => ProviderError::Timeout(config.timeout),
                false => ProviderError::Transport(e.to_string()),
            })?;

        let status = response.status();
        match status.as_u16() {
            429 => {
                return Err(ProviderError::RateLimited {
                    retry_after: retry_after(response.headers()),
                })
            }
            401 | 403 => return Err(ProviderError::Unauthorized),
            _ if !status.is_success() => {
                let message = match response.json::<ErrorReply>().await {
                    Ok(reply) => reply.error.message,
                    Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
                };
                return Err(ProviderError::Status {
                    code: status.as_u16(),
                    message,
                });
            }
            _ => {}
        }

        let reply: MessagesReply = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(Completion {
            text: reply.content.into_iter().filter_map(|b| b.text).collect(),
            usage: TokenUsage {
                input: reply.usage.input_tokens,
                output: reply.usage.output_tokens,
                cache_read: reply.usage.cache_read_input_tokens,
                cache_write: reply.usage.cache_creation_input_tokens,
            },
            model: reply.model,
            truncated: reply.stop_reason.as_deref() == Some("max_tokens"),
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRole;

    #[test]
    fn test_key_not_in_debug_output() {
        let provider = AnthropicProvider::new(ApiKey::explicit("sk-ant-super-secret")).unwrap();
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-ant-super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_body_marks_system_prompt_cacheable() {
        let request = CompletionRequest::new(AgentRole::RiskAssessor, "rules", "clauses");
        let config = CompletionConfig::default();
        let json = serde_json::to_value(body(&request, &config)).unwrap();

        assert_eq!(json["system"][0]["text"], "rules");
        assert_eq!(json["system"][0]["cache_control"]["type"], "ephemeral");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "clauses");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_body_without_caching() {
        let request = CompletionRequest::new(AgentRole::Parser, "rules", "text");
        let config = CompletionConfig {
            cache_system_prompt: false,
            temperature: 0.3,
            ..Default::default()
        };
        let json = serde_json::to_value(body(&request, &config)).unwrap();
        assert!(json["system"][0].get("cache_control").is_none());
        assert!((json["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }
}
