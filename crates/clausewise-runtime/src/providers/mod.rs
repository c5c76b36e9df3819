//! Completion backends for the model-backed agents.
//!
//! Every agent call is one system prompt plus one user turn, so the provider
//! interface takes exactly that. Keys live in an [`ApiKey`]; see [`secrets`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::agents::AgentRole;

pub mod secrets;

#[cfg(feature = "anthropic")]
mod anthropic;

pub use secrets::{ApiKey, KeySource};

#[cfg(feature = "anthropic")]
pub use anthropic::{AnthropicProvider, ANTHROPIC_API_KEY_ENV};

/// Errors from a completion backend.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("backend returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("undecodable response: {0}")]
    Decode(String),

    #[error("credential rejected")]
    Unauthorized,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("missing credential: {0}")]
    MissingCredential(String),
}

impl ProviderError {
    /// Only rate limits are worth retrying with the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Model settings shared by all roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub model: String,

    pub max_tokens: u32,

    /// 0.0 keeps replies reproducible
    pub temperature: f32,

    #[serde(with = "crate::config::humantime_duration")]
    pub timeout: Duration,

    /// Mark the system prompt as a cacheable prefix
    pub cache_system_prompt: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250514".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
            cache_system_prompt: true,
        }
    }
}

/// One agent call: the role's system prompt and the document context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompletionRequest {
    pub role: AgentRole,
    pub system: String,
    pub user: String,
}

impl CompletionRequest {
    pub fn new(role: AgentRole, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            role,
            system: system.into(),
            user: user.into(),
        }
    }

    /// Characters sent to the backend.
    pub fn prompt_len(&self) -> usize {
        self.system.len() + self.user.len()
    }
}

/// A finished completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    pub model: String,
    pub truncated: bool,
}

/// Tokens billed for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,

    /// Input tokens served from the prompt cache
    pub cache_read: u32,

    /// Input tokens written to the prompt cache
    pub cache_write: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input + self.output
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
        config: &CompletionConfig,
    ) -> Result<Completion, ProviderError>;

    fn name(&self) -> &str;

    /// Rough token count used for budget checks before a call.
    fn estimate_tokens(&self, request: &CompletionRequest) -> u32 {
        // ~4 chars per token
        (request.prompt_len() / 4) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_counts_both_prompts() {
        struct Null;

        #[async_trait]
        impl LlmProvider for Null {
            async fn complete(
                &self,
                _: &CompletionRequest,
                _: &CompletionConfig,
            ) -> Result<Completion, ProviderError> {
                Err(ProviderError::MissingCredential("none".into()))
            }

            fn name(&self) -> &str {
                "null"
            }
        }

        let request = CompletionRequest::new(AgentRole::Parser, "a".repeat(40), "b".repeat(40));
        assert_eq!(Null.estimate_tokens(&request), 20);
    }

    #[test]
    fn test_only_rate_limits_retry() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_retryable());
        assert!(!ProviderError::Unauthorized.is_retryable());
        assert!(!ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_completion_config_from_yaml() {
        let config: CompletionConfig =
            serde_yaml::from_str("model: claude-haiku-4-5\ntimeout: 90s\n").unwrap();
        assert_eq!(config.model, "claude-haiku-4-5");
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert!(config.cache_system_prompt);
    }
}
