//! Completion cache.
//!
//! Wraps a provider and serves identical requests from memory, so analysing
//! the same document twice does not pay for the model calls twice.

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::providers::{
    Completion, CompletionConfig, CompletionRequest, LlmProvider, ProviderError, TokenUsage,
};

/// Cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    pub max_entries: u64,

    #[serde(with = "crate::config::humantime_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Provider decorator that memoises completions.
pub struct CachedProvider {
    inner: Arc<dyn LlmProvider>,
    cache: Cache<u64, Completion>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();

        Self { inner, cache }
    }

    /// Completions held; moka counts lazily so this can lag behind inserts.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl LlmProvider for CachedProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
        config: &CompletionConfig,
    ) -> Result<Completion, ProviderError> {
        let key = request_key(request, config);

        if let Some(mut hit) = self.cache.get(&key).await {
            tracing::debug!(role = %request.role, provider = self.inner.name(), "Completion cache hit");
            // nothing was billed for this one
            hit.usage = TokenUsage::default();
            return Ok(hit);
        }

        let completion = self.inner.complete(request, config).await?;
        if !completion.truncated {
            self.cache.insert(key, completion.clone()).await;
        }
        Ok(completion)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn estimate_tokens(&self, request: &CompletionRequest) -> u32 {
        self.inner.estimate_tokens(request)
    }
}

fn request_key(request: &CompletionRequest, config: &CompletionConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    request.hash(&mut hasher);
    config.model.hash(&mut hasher);
    config.max_tokens.hash(&mut hasher);
    config.temperature.to_bits().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRole;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingProvider {
        calls: AtomicU32,
        truncate: bool,
    }

    impl CountingProvider {
        fn new(truncate: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                truncate,
            })
        }
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        async fn complete(
            &self,
            request: &CompletionRequest,
            config: &CompletionConfig,
        ) -> Result<Completion, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Completion {
                text: format!("echo: {}", request.user),
                usage: TokenUsage {
                    input: 12,
                    output: 3,
                    ..Default::default()
                },
                model: config.model.clone(),
                truncated: self.truncate,
            })
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_identical_requests_hit_cache() {
        let inner = CountingProvider::new(false);
        let cached = CachedProvider::new(inner.clone(), &CacheConfig::default());
        let config = CompletionConfig::default();
        let request = CompletionRequest::new(AgentRole::Parser, "rules", "contract");

        let first = cached.complete(&request, &config).await.unwrap();
        let second = cached.complete(&request, &config).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        cached.cache.run_pending_tasks().await;
        assert_eq!(cached.entry_count(), 1);
        assert_eq!(second.text, "echo: contract");
        assert_eq!(first.usage.total(), 15);
        assert_eq!(second.usage.total(), 0);
    }

    #[tokio::test]
    async fn test_role_and_text_are_part_of_key() {
        let inner = CountingProvider::new(false);
        let cached = CachedProvider::new(inner.clone(), &CacheConfig::default());
        let config = CompletionConfig::default();

        for request in [
            CompletionRequest::new(AgentRole::Parser, "rules", "a"),
            CompletionRequest::new(AgentRole::Parser, "rules", "b"),
            CompletionRequest::new(AgentRole::Summariser, "rules", "a"),
        ] {
            cached.complete(&request, &config).await.unwrap();
        }

        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_truncated_replies_are_not_cached() {
        let inner = CountingProvider::new(true);
        let cached = CachedProvider::new(inner.clone(), &CacheConfig::default());
        let config = CompletionConfig::default();
        let request = CompletionRequest::new(AgentRole::ClauseExtractor, "rules", "long");

        cached.complete(&request, &config).await.unwrap();
        cached.complete(&request, &config).await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        cached.cache.run_pending_tasks().await;
        assert_eq!(cached.entry_count(), 0);
    }
}
