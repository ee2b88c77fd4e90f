//! Model Context Protocol plumbing: transports, client, connection pool.

pub mod client;
pub mod pool;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ConnectionState, McpClient, ToolCallOutcome};
pub use pool::{ClientPool, DisposalHook, PoolConfig, SharedClient};
pub use transport::{transport_for, McpTransport, SseTransport, StdioTransport, WsTransport};

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::ServerDescriptor;

/// Opens an initialized client for a server.
///
/// The default goes through [`transport_for`]; tests swap in scripted
/// connectors so no real server is needed.
pub type Connector =
    Arc<dyn Fn(&ServerDescriptor) -> BoxFuture<'static, Result<McpClient>> + Send + Sync>;

pub fn default_connector() -> Connector {
    Arc::new(|server: &ServerDescriptor| {
        let server = server.clone();
        Box::pin(async move {
            let mut client = McpClient::new(transport_for(&server));
            client.initialize().await?;
            Ok(client)
        })
    })
}

/// Serve an MCP server handler in-process and hand back a connected
/// client. The pair is wired over crossed channels; the server side runs
/// as a background task for as long as the client keeps its end open.
pub async fn connect_in_process<S>(service: S) -> Result<McpClient>
where
    S: rmcp::ServerHandler + Send + 'static,
{
    use rmcp::ServiceExt;

    use crate::error::ToolgateError;

    let (client_transport, server_transport) = transport::duplex_pair();

    tokio::spawn(async move {
        match service.serve(server_transport).await {
            Ok(running) => {
                let _ = running.waiting().await;
            }
            Err(error) => tracing::warn!(%error, "in-process serve failed"),
        }
    });

    let session = rmcp::model::ClientInfo::default()
        .into_dyn()
        .serve(client_transport)
        .await
        .map_err(|error| {
            ToolgateError::Transport(format!("in-process connect failed: {error}"))
        })?;

    let mut client = McpClient::from_running_service(session);
    client.initialize().await?;
    Ok(client)
}
