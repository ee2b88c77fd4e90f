//! Convenience re-exports for embedding toolgate.

pub use crate::agent::{Agent, AnthropicAgent};
pub use crate::agent_loop::{AgentLoop, TurnEnd};
pub use crate::catalog::{Embedder, HashEmbedder, MemoryToolStore, ToolCatalog, ToolStore};
pub use crate::config::ToolgateConfig;
pub use crate::conversation::{ContentBlock, Conversation, Message, Role};
pub use crate::error::{Result, ToolgateError};
pub use crate::mcp::{ClientPool, Connector, McpClient, PoolConfig, SharedClient};
pub use crate::registry::{RegistryClient, RegistryService};
pub use crate::toolbox::Toolbox;
pub use crate::types::{
    ConnectionKey, ResultChunk, ServerDescriptor, ToolDescriptor, ToolOrigin, TransportKind,
};
