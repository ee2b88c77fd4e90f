//! Vendor wire adapter (Anthropic Messages API content shapes).
//!
//! Translates between the neutral block types and vendor content blocks,
//! lifting sentinel markers into typed terminal blocks on ingest and
//! serializing them back to plain text on emit.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolgateError};
use crate::types::ResultChunk;

use super::hygiene::scrub_text;
use super::{ContentBlock, Conversation, Role};

/// Sentinel marker: the model needs more input from the user.
pub const NEED_USER_INPUT: &str = "NEED_USER_INPUT";
/// Sentinel marker: the model is done with the turn.
pub const FINAL_RESPONSE: &str = "FINAL_RESPONSE";

fn user_input_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)NEED_USER_INPUT:?[ \t]*(.*?)(?:\n[ \t]*\n|\z)")
            .expect("user-input sentinel regex is valid")
    })
}

fn final_response_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)FINAL_RESPONSE:?[ \t]*(.*?)(?:\n[ \t]*\n|\z)")
            .expect("final-response sentinel regex is valid")
    })
}

/// Classify raw vendor text: sentinel markers become terminal blocks, the
/// rest becomes a scrubbed `Text` block. Re-running on already-serialized
/// sentinel text yields the same block.
pub fn classify_text(raw: &str) -> ContentBlock {
    let final_at = raw.find(FINAL_RESPONSE);
    let input_at = raw.find(NEED_USER_INPUT);

    match (final_at, input_at) {
        // When both markers appear, the earlier one governs; a tie cannot
        // happen since the markers differ.
        (Some(f), Some(u)) if u < f => user_input_block(raw),
        (Some(_), _) => final_response_block(raw),
        (None, Some(_)) => user_input_block(raw),
        (None, None) => ContentBlock::Text {
            text: scrub_text(raw),
            user_facing: false,
        },
    }
}

fn final_response_block(raw: &str) -> ContentBlock {
    let response = final_response_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    ContentBlock::FinalResponse { response }
}

fn user_input_block(raw: &str) -> ContentBlock {
    let request = user_input_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    ContentBlock::UserInput { request }
}

/// Vendor-side content block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireBlock {
    Text {
        text: String,
    },
    Thinking {
        signature: String,
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<WireResultPart>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// Any vendor block kind this adapter does not model.
    #[serde(other)]
    Unknown,
}

/// Vendor-side tool-result content part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireResultPart {
    Text { text: String },
    Image { source: serde_json::Value },
}

/// Vendor-side message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireMessage {
    pub role: String,
    pub content: Vec<WireBlock>,
}

/// Map one inbound vendor block to a neutral block. Image parts inside
/// tool results are rejected here, at ingest.
pub fn ingest_block(block: WireBlock) -> Result<ContentBlock> {
    match block {
        WireBlock::Text { text } => Ok(classify_text(&text)),
        WireBlock::Thinking {
            signature,
            thinking,
        } => Ok(ContentBlock::Thinking {
            signature,
            text: thinking,
        }),
        WireBlock::ToolUse { id, name, input } => Ok(ContentBlock::ToolUse {
            id,
            name,
            args: input,
        }),
        WireBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let mut chunks = Vec::with_capacity(content.len());
            for part in content {
                match part {
                    WireResultPart::Text { text } => chunks.push(ResultChunk::text(text)),
                    WireResultPart::Image { .. } => {
                        return Err(ToolgateError::Protocol(
                            "image parts in tool results are not supported".into(),
                        ))
                    }
                }
            }
            Ok(ContentBlock::ToolResult {
                tool_use_id,
                content: chunks,
                is_error,
            })
        }
        WireBlock::Unknown => Err(ToolgateError::Protocol(
            "unsupported vendor content block".into(),
        )),
    }
}

/// Map one neutral block to its vendor form. Sentinels serialize back as
/// plain text; everything else maps one-for-one.
pub fn emit_block(block: &ContentBlock) -> WireBlock {
    match block {
        ContentBlock::Text { text, .. } => WireBlock::Text { text: text.clone() },
        ContentBlock::Thinking { signature, text } => WireBlock::Thinking {
            signature: signature.clone(),
            thinking: text.clone(),
        },
        ContentBlock::ToolUse { id, name, args } => WireBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: args.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => WireBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content
                .iter()
                .map(|c| WireResultPart::Text {
                    text: c.text.clone(),
                })
                .collect(),
            is_error: *is_error,
        },
        ContentBlock::UserInput { request } => WireBlock::Text {
            text: format!("{NEED_USER_INPUT}: {request}"),
        },
        ContentBlock::FinalResponse { response } => WireBlock::Text {
            text: format!("{FINAL_RESPONSE}: {response}"),
        },
        ContentBlock::Exception { message } => WireBlock::Text {
            text: format!("[exception] {message}"),
        },
    }
}

/// Flatten a conversation into the vendor request shape: system text plus
/// role-alternating messages. Consecutive same-role messages (a user query
/// followed by tool-result messages, say) are merged into one wire message.
pub fn to_wire(conversation: &Conversation) -> (Option<String>, Vec<WireMessage>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<WireMessage> = Vec::new();

    for message in conversation.messages() {
        match message.role {
            Role::System => {
                for block in &message.content {
                    if let WireBlock::Text { text } = emit_block(block) {
                        system_parts.push(text);
                    }
                }
            }
            Role::User | Role::Assistant => {
                let role = match message.role {
                    Role::User => "user",
                    _ => "assistant",
                };
                let content: Vec<WireBlock> = message.content.iter().map(emit_block).collect();
                if content.is_empty() {
                    continue;
                }
                match messages.last_mut() {
                    Some(last) if last.role == role => last.content.extend(content),
                    _ => messages.push(WireMessage {
                        role: role.to_string(),
                        content,
                    }),
                }
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, messages)
}

/// Ingest a full vendor response into neutral blocks. Block kinds this
/// adapter does not model are dropped with a warning.
pub fn ingest_blocks(blocks: Vec<WireBlock>) -> Result<Vec<ContentBlock>> {
    blocks
        .into_iter()
        .filter(|block| {
            if matches!(block, WireBlock::Unknown) {
                tracing::warn!("dropping unrecognized vendor content block");
                false
            } else {
                true
            }
        })
        .map(ingest_block)
        .collect()
}
