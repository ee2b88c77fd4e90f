//! MCP client for connecting to MCP servers.

use std::time::Duration;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, ProtocolVersion, RawContent, ResourceContents,
};
use rmcp::service::{ClientInitializeError, ServiceError};

use super::transport::{McpRunningService, McpTransport};
use crate::error::{Result, ToolgateError};
use crate::types::{ResultChunk, ToolDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Initialized,
    Closed,
}

/// Structured result of one tool call: ordered text chunks (machine-readable
/// payloads flagged `is_json`), the server's error flag, and opaque meta.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    pub content: Vec<ResultChunk>,
    pub is_error: bool,
    pub meta: Option<serde_json::Value>,
}

impl ToolCallOutcome {
    /// The machine-readable chunk, when the server marked one.
    pub fn json_chunk(&self) -> Option<&ResultChunk> {
        self.content.iter().find(|chunk| chunk.is_json)
    }

    /// All chunk text joined for display.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Client for one Model Context Protocol server.
pub struct McpClient {
    transport: Option<Box<dyn McpTransport>>,
    session: Option<McpRunningService>,
    state: ConnectionState,
}

impl McpClient {
    /// Create a new MCP client with the given transport.
    pub fn new(transport: Box<dyn McpTransport>) -> Self {
        Self {
            transport: Some(transport),
            session: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Create a client from an already-running rmcp service (the handshake
    /// has been handled by `serve`).
    pub fn from_running_service(session: McpRunningService) -> Self {
        Self {
            transport: None,
            session: Some(session),
            state: ConnectionState::Connected,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == ConnectionState::Initialized
    }

    /// Initialize the MCP connection.
    pub async fn initialize(&mut self) -> Result<()> {
        if let Some(session) = self.session.as_ref() {
            if session.is_transport_closed() {
                self.session = None;
                self.state = ConnectionState::Closed;
                if self.transport.is_none() {
                    return Err(ToolgateError::Transport("MCP session is closed".into()));
                }
                self.state = ConnectionState::Disconnected;
            } else {
                self.state = ConnectionState::Initialized;
                return Ok(());
            }
        }

        if self.session.is_none() {
            let session = self.connect_with_protocol_fallback().await?;
            self.session = Some(session);
        }

        self.state = ConnectionState::Initialized;
        Ok(())
    }

    /// List available tools from the MCP server.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>> {
        self.ensure_initialized()?;

        let tools = match self.list_tools_from_active_session().await {
            Ok(tools) => tools,
            Err(error) if Self::should_reconnect_after_service_error(&error) => {
                self.reset_for_reconnect()?;
                self.initialize().await?;
                self.list_tools_from_active_session()
                    .await
                    .map_err(|retry_error| map_service_error("list_tools", retry_error))?
            }
            Err(error) => return Err(map_service_error("list_tools", error)),
        };

        Ok(tools.into_iter().map(map_tool_descriptor).collect())
    }

    /// Execute a tool on the MCP server.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallOutcome> {
        self.ensure_initialized()?;
        let arguments = coerce_tool_arguments(arguments)?;

        let result = match self
            .call_tool_from_active_session(name, arguments.clone())
            .await
        {
            Ok(result) => result,
            Err(error) if Self::should_reconnect_after_service_error(&error) => {
                self.reset_for_reconnect()?;
                self.initialize().await?;
                self.call_tool_from_active_session(name, arguments)
                    .await
                    .map_err(|retry_error| map_service_error("call_tool", retry_error))?
            }
            Err(error) => return Err(map_service_error("call_tool", error)),
        };

        map_call_result(result)
    }

    /// Execute a tool with a per-call deadline. The deadline cancels this
    /// request only; the client stays usable.
    pub async fn call_tool_with_deadline(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
        deadline: Duration,
    ) -> Result<ToolCallOutcome> {
        match tokio::time::timeout(deadline, self.call_tool(name, arguments)).await {
            Ok(result) => result,
            Err(_) => Err(ToolgateError::Timeout(deadline.as_millis() as u64)),
        }
    }

    /// Close the client and its underlying session.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;

        if let Some(session) = self.session.take() {
            session
                .cancel()
                .await
                .map_err(|error| ToolgateError::Transport(format!("close failed: {error}")))?;
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        match self.state {
            ConnectionState::Initialized => Ok(()),
            ConnectionState::Closed => {
                Err(ToolgateError::Transport("MCP session is closed".into()))
            }
            _ => Err(ToolgateError::InvalidState(
                "MCP client must be initialized first".into(),
            )),
        }
    }

    async fn connect_with_protocol_fallback(&mut self) -> Result<McpRunningService> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| ToolgateError::InvalidState("missing MCP session".into()))?;

        let latest_client_info = rmcp::model::ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            ..Default::default()
        };

        match transport.connect(latest_client_info).await {
            Ok(session) => return Ok(session),
            Err(error) if Self::should_retry_protocol_fallback(&error) => {}
            Err(error) => return Err(map_client_initialize_error(error)),
        }

        let fallback_client_info = rmcp::model::ClientInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            ..Default::default()
        };
        transport
            .connect(fallback_client_info)
            .await
            .map_err(map_client_initialize_error)
    }

    async fn list_tools_from_active_session(
        &mut self,
    ) -> std::result::Result<Vec<rmcp::model::Tool>, ServiceError> {
        let session = self.session.as_mut().ok_or(ServiceError::TransportClosed)?;

        match session.list_all_tools().await {
            Ok(tools) => Ok(tools),
            Err(ServiceError::UnexpectedResponse) => {
                session.list_tools(None).await.map(|page| page.tools)
            }
            Err(error) => Err(error),
        }
    }

    async fn call_tool_from_active_session(
        &mut self,
        name: &str,
        arguments: Option<rmcp::model::JsonObject>,
    ) -> std::result::Result<CallToolResult, ServiceError> {
        let session = self.session.as_mut().ok_or(ServiceError::TransportClosed)?;

        session
            .call_tool(CallToolRequestParam {
                name: name.to_owned().into(),
                arguments,
            })
            .await
    }

    fn reset_for_reconnect(&mut self) -> Result<()> {
        if self.transport.is_none() {
            self.state = ConnectionState::Closed;
            return Err(ToolgateError::Transport("MCP session is closed".into()));
        }

        self.session = None;
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn should_reconnect_after_service_error(error: &ServiceError) -> bool {
        matches!(
            error,
            ServiceError::TransportClosed
                | ServiceError::TransportSend(_)
                | ServiceError::Cancelled { .. }
        )
    }

    fn should_retry_protocol_fallback(error: &ClientInitializeError) -> bool {
        match error {
            _ => false,
        }
    }
}

fn map_tool_descriptor(tool: rmcp::model::Tool) -> ToolDescriptor {
    ToolDescriptor {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
        input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

fn coerce_tool_arguments(
    value: serde_json::Value,
) -> Result<Option<rmcp::model::JsonObject>> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let parsed: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
                ToolgateError::InvalidArgument(format!(
                    "MCP tool arguments must be valid JSON: {e}"
                ))
            })?;
            coerce_tool_arguments(parsed)
        }
        other => Err(ToolgateError::InvalidArgument(format!(
            "MCP tool arguments must be a JSON object; got {other}"
        ))),
    }
}

/// Map an rmcp call result into chunks, rejecting image content and
/// surfacing `structuredContent` as the JSON-marked chunk.
fn map_call_result(result: CallToolResult) -> Result<ToolCallOutcome> {
    let mut chunks = Vec::with_capacity(result.content.len() + 1);

    if let Some(structured) = &result.structured_content {
        chunks.push(ResultChunk::json(structured.to_string()));
    }

    for item in &result.content {
        match &item.raw {
            RawContent::Text(text) => chunks.push(ResultChunk::text(text.text.clone())),
            RawContent::Image(_) => {
                return Err(ToolgateError::Protocol(
                    "image content in tool results is not supported".into(),
                ))
            }
            RawContent::Resource(embedded) => {
                if let ResourceContents::TextResourceContents { text, .. } = &embedded.resource {
                    chunks.push(ResultChunk::text(text.clone()));
                }
            }
            other => {
                // Preserve anything we do not model verbatim.
                if let Ok(raw) = serde_json::to_string(other) {
                    chunks.push(ResultChunk::text(raw));
                }
            }
        }
    }

    let meta = serde_json::to_value(&result.meta)
        .ok()
        .filter(|value| !value.is_null());

    Ok(ToolCallOutcome {
        content: chunks,
        is_error: result.is_error.unwrap_or(false),
        meta,
    })
}

fn map_client_initialize_error(error: ClientInitializeError) -> ToolgateError {
    match error {
        ClientInitializeError::ConnectionClosed(context) => {
            ToolgateError::Transport(format!("MCP initialize connection closed: {context}"))
        }
        ClientInitializeError::TransportError { error, context } => ToolgateError::Transport(
            format!("MCP initialize transport error ({context}): {error}"),
        ),
        ClientInitializeError::Cancelled => {
            ToolgateError::Transport("MCP initialize cancelled".into())
        }
        other => ToolgateError::Protocol(format!("MCP initialize error: {other}")),
    }
}

fn map_service_error(context: &str, error: ServiceError) -> ToolgateError {
    match error {
        ServiceError::McpError(error) => ToolgateError::Protocol(format!(
            "{context}: MCP error {}: {}",
            error.code.0, error.message
        )),
        ServiceError::TransportSend(error) => {
            ToolgateError::Transport(format!("{context}: MCP transport send failed: {error}"))
        }
        ServiceError::TransportClosed => {
            ToolgateError::Transport(format!("{context}: MCP transport closed"))
        }
        ServiceError::UnexpectedResponse => {
            ToolgateError::Protocol(format!("{context}: unexpected MCP response"))
        }
        ServiceError::Cancelled { reason } => {
            let suffix = reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            ToolgateError::Transport(format!("{context}: MCP request cancelled{suffix}"))
        }
        ServiceError::Timeout { timeout } => {
            ToolgateError::Timeout(timeout.as_millis() as u64)
        }
        other => ToolgateError::Protocol(format!("{context}: MCP service error: {other}")),
    }
}
