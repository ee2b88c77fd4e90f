//! CLI-specific error formatting for user-facing messages.

use toolgate_core::error::ToolgateError;

/// Map a [`ToolgateError`] to a user-facing help string with actionable
/// guidance.
pub fn format_error_help(err: &ToolgateError) -> String {
    match err {
        ToolgateError::Configuration(msg) => {
            format!("Configuration error: {msg}. Check your .env (ANTHROPIC_API_KEY, MODEL_NAME, ANT_VERSION).")
        }
        ToolgateError::Api { status: 401, .. } => {
            "Authentication failed (401). Check ANTHROPIC_API_KEY.".to_string()
        }
        ToolgateError::Transport(msg) => {
            format!("Transport error: {msg}. Is the server spec reachable?")
        }
        ToolgateError::Registration { summary, .. } => {
            format!("Tool name conflict: {summary}")
        }
        other => format!("{other}"),
    }
}
