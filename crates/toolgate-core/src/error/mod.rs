//! Error types for toolgate.

use thiserror::Error;

/// Primary error type for all toolgate operations.
#[derive(Error, Debug)]
pub enum ToolgateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Registration conflict: {summary}")]
    Registration {
        summary: String,
        names: Vec<String>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

/// One duplicate-name collision detected during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConflict {
    pub name: String,
    pub existing_origin: String,
    pub incoming_origin: String,
}

impl ToolgateError {
    /// Build the compound registration error for a batch of collisions.
    /// The whole batch is rejected; callers must not apply partial state.
    pub fn registration(conflicts: &[ToolConflict]) -> Self {
        let summary = conflicts
            .iter()
            .map(|c| {
                format!(
                    "'{}' already bound to {} (rejected from {})",
                    c.name, c.existing_origin, c.incoming_origin
                )
            })
            .collect::<Vec<_>>()
            .join("; ");
        Self::Registration {
            summary,
            names: conflicts.iter().map(|c| c.name.clone()).collect(),
        }
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Network(_) | Self::Timeout(_)
        ) || matches!(self, Self::Api { status, .. } if *status == 429 || *status >= 500)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ToolgateError>;
