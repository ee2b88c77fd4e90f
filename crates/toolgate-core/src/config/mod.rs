//! Configuration bound once at startup; no ambient env reads elsewhere.

use std::time::Duration;

use crate::error::{Result, ToolgateError};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_POOL_CAPACITY: usize = 10;
pub const DEFAULT_POOL_TTL: Duration = Duration::from_secs(30 * 60);

/// Runtime configuration for a toolgate session.
///
/// Built from the environment exactly once at startup and passed down; the
/// core never reads environment variables after this.
#[derive(Debug, Clone)]
pub struct ToolgateConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub anthropic_version: String,
    pub max_depth: usize,
    pub max_tokens: u32,
    pub pool_capacity: usize,
    pub pool_ttl: Duration,
    /// Overall deadline for a single turn, including nested calls.
    pub turn_timeout: Option<Duration>,
}

impl Default for ToolgateConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_tokens: DEFAULT_MAX_TOKENS,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            pool_ttl: DEFAULT_POOL_TTL,
            turn_timeout: None,
        }
    }
}

impl ToolgateConfig {
    /// Load from environment variables (`.env` honored when present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.trim().is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("MODEL_NAME") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        if let Ok(version) = std::env::var("ANT_VERSION") {
            if !version.trim().is_empty() {
                config.anthropic_version = version;
            }
        }
        if let Ok(depth) = std::env::var("MAX_RECURSION_DEPTH") {
            match depth.trim().parse::<usize>() {
                Ok(value) if value > 0 => config.max_depth = value,
                _ => tracing::warn!(
                    raw = %depth,
                    "ignoring invalid MAX_RECURSION_DEPTH, keeping {}",
                    config.max_depth
                ),
            }
        }

        config
    }

    /// API key, or a configuration error naming the missing variable.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ToolgateError::Configuration("ANTHROPIC_API_KEY is not set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = ToolgateConfig::default();
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.pool_capacity, 10);
        assert_eq!(config.pool_ttl, Duration::from_secs(1800));
        assert_eq!(config.anthropic_version, "2023-06-01");
    }

    #[test]
    fn require_api_key_errors_when_missing() {
        let config = ToolgateConfig::default();
        let err = config
            .require_api_key()
            .expect_err("missing key should error");
        assert!(matches!(
            err,
            ToolgateError::Configuration(msg) if msg.contains("ANTHROPIC_API_KEY")
        ));
    }

    #[test]
    fn require_api_key_returns_configured_key() {
        let config = ToolgateConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        assert_eq!(config.require_api_key().expect("key is set"), "sk-test");
    }
}
