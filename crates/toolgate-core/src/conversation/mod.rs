//! Conversation model: typed content blocks and message history.
//!
//! Blocks are a tagged sum; vendor round-trip lives in [`wire`], text
//! cleanup in [`hygiene`]. A finalized message is never mutated.

pub mod hygiene;
pub mod wire;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ResultChunk;

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single typed block of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
        #[serde(default)]
        user_facing: bool,
    },
    Thinking {
        signature: String,
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        args: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<ResultChunk>,
        #[serde(default)]
        is_error: bool,
    },
    /// Terminal sentinel: the model is asking the user for input.
    UserInput { request: String },
    /// Terminal sentinel: the model's final answer for this turn.
    FinalResponse { response: String },
    /// Caught error surfaced to the user; does not terminate by itself.
    Exception { message: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            user_facing: false,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            text: text.into(),
            user_facing: true,
        }
    }

    /// Whether this block terminates the turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContentBlock::UserInput { .. } | ContentBlock::FinalResponse { .. }
        )
    }

    /// The user-visible text of this block, if any.
    pub fn user_facing_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text, user_facing } if *user_facing => Some(text),
            ContentBlock::UserInput { request } => Some(request),
            ContentBlock::FinalResponse { response } => Some(response),
            ContentBlock::Exception { message } => Some(message),
            _ => None,
        }
    }
}

/// A message: a role plus an ordered sequence of blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            timestamp: Some(Utc::now()),
        }
    }

    /// A user message holding one user-facing text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::user_text(text)])
    }

    /// A user-role message carrying one tool result.
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: Vec<ResultChunk>,
        is_error: bool,
    ) -> Self {
        Self::new(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content,
                is_error,
            }],
        )
    }

    /// A system-role message surfacing a caught error.
    pub fn exception(message: impl Into<String>) -> Self {
        Self::new(
            Role::System,
            vec![ContentBlock::Exception {
                message: message.into(),
            }],
        )
    }
}

/// Ordered message history for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Compact user-facing projection of messages `from..` (for the REPL).
    pub fn user_facing_lines(&self, from: usize) -> Vec<String> {
        self.messages[from.min(self.messages.len())..]
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|b| b.user_facing_text().map(str::to_owned))
            .collect()
    }

    /// Check that every tool result correlates to a preceding tool use.
    pub fn tool_results_correlated(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        for message in &self.messages {
            for block in &message.content {
                match block {
                    ContentBlock::ToolUse { id, .. } => {
                        seen.insert(id.as_str());
                    }
                    ContentBlock::ToolResult { tool_use_id, .. } => {
                        if !seen.contains(tool_use_id.as_str()) {
                            return false;
                        }
                    }
                    _ => {}
                }
            }
        }
        true
    }
}
