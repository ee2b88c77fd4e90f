//! The model boundary: a stateless per-turn chat contract.

pub mod anthropic;

pub use anthropic::AnthropicAgent;

use async_trait::async_trait;

use crate::conversation::{ContentBlock, Conversation};
use crate::error::Result;
use crate::types::ToolDescriptor;

/// Stateless per-turn contract: conversation plus tool surface in, new
/// blocks out. Implementations own their wire format, system prompt,
/// model name and token budget; they know nothing of the toolbox.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn chat(
        &self,
        conversation: &Conversation,
        tools: &[ToolDescriptor],
    ) -> Result<Vec<ContentBlock>>;
}
