//! MCP transport layer.
//!
//! Each transport knows how to open a framed channel to one MCP peer and
//! hand back an initialized rmcp running service; the protocol layer on
//! top is [`crate::mcp::client::McpClient`].

use async_trait::async_trait;
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, DynService, RoleClient, RunningService};

use crate::error::ToolgateError;
use crate::types::{ServerDescriptor, TransportKind};

pub type DynClientService = Box<dyn DynService<RoleClient>>;
pub type McpRunningService = RunningService<RoleClient, DynClientService>;

/// Transport trait for MCP communication.
#[async_trait]
pub trait McpTransport: Send {
    /// Open the channel and run the MCP initialize handshake. Errors here
    /// are fatal for this transport instance.
    async fn connect(
        &mut self,
        client_info: ClientInfo,
    ) -> Result<McpRunningService, ClientInitializeError>;

    /// Close the transport. Idempotent; connect fails afterwards.
    async fn close(&mut self) -> Result<(), ToolgateError>;
}

mod common;
mod sse;
mod stdio;
mod ws;

pub(crate) use common::{duplex_pair, ChannelTransport};
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use ws::WsTransport;

/// Build the transport matching a server descriptor.
pub fn transport_for(server: &ServerDescriptor) -> Box<dyn McpTransport> {
    match server.transport {
        TransportKind::Stdio => Box::new(StdioTransport::from_server(server)),
        TransportKind::Sse => Box::new(SseTransport::from_server(server)),
        TransportKind::Ws => Box::new(WsTransport::from_server(server)),
    }
}
