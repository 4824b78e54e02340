//! Configuration for the completion backend, cache, and repair policy.
//!
//! All collaborators are explicitly constructed and passed in; nothing here
//! is process-global.

use std::time::Duration;

use crate::cache::DEFAULT_TTL;
use crate::error::SynthesisError;

/// Default completion model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default chat-completions endpoint base.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for the OpenAI-compatible completion backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Wall-clock budget for one full streamed completion.
    pub timeout: Duration,
    pub max_tokens: Option<u32>,
}

impl OpenAiConfig {
    /// Create a config with defaults for everything but the API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_tokens: None,
        }
    }

    /// Create from environment variables.
    ///
    /// `OPENAI_API_KEY` is required; `OPENAI_MODEL` and `OPENAI_BASE_URL`
    /// override the defaults.
    pub fn from_env() -> Result<Self, SynthesisError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| SynthesisError::Authentication)?;
        if api_key.is_empty() {
            return Err(SynthesisError::Authentication);
        }
        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            config.model = model;
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Configuration for the completion cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live for each cached completion.
    pub ttl: Duration,
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            max_entries: 10_000,
        }
    }
}

/// Bound on repair cycles in the repair loop.
///
/// `max_repair_attempts` counts re-synthesis cycles after the initial
/// candidate; 1 reproduces the original single-shot fix behavior.
#[derive(Debug, Clone, Copy)]
pub struct RepairPolicy {
    pub max_repair_attempts: u32,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_repair_attempts: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_uses_defaults() {
        let config = OpenAiConfig::new("key");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn builder_overrides_apply() {
        let config = OpenAiConfig::new("key")
            .with_model("gpt-4o")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn default_policy_is_single_shot() {
        assert_eq!(RepairPolicy::default().max_repair_attempts, 1);
    }

    #[test]
    fn default_cache_ttl_is_one_hour() {
        assert_eq!(CacheConfig::default().ttl, Duration::from_secs(3600));
    }
}
