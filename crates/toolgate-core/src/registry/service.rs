//! The catalogue exposed as an MCP server (meta-tools).
//!
//! Every response carries the machine-readable payload as
//! `structuredContent` plus a human-readable text block. On error the
//! payload is JSON `null` and the text block carries the message.

use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::ToolCatalog;
use crate::error::{Result as CrateResult, ToolgateError};
use crate::types::{ServerDescriptor, ToolDescriptor, TransportKind};

pub const QUERY_TOOLS: &str = "query-tools";
pub const LIST_TOOLS: &str = "list-tools";
pub const ADD_TOOL: &str = "add-tool";
pub const ADD_SERVER: &str = "add-server";
pub const DELETE_TOOL: &str = "delete-tool";

/// Names of every meta-tool, in the order they are advertised.
pub const META_TOOL_NAMES: [&str; 5] =
    [QUERY_TOOLS, LIST_TOOLS, ADD_TOOL, ADD_SERVER, DELETE_TOOL];

/// Origin recorded for tools registered via `add-tool`, which carries no
/// server of its own.
const LOCAL_ORIGIN_URL: &str = "registry://local";

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryToolsParams {
    /// Natural-language description of the capability being looked for
    #[schemars(description = "What kind of tool is needed")]
    pub query: String,
    /// Maximum number of matches to return (default: 10)
    #[schemars(description = "Maximum number of matches to return (default: 10)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddToolParams {
    /// The tool descriptor to store
    #[schemars(description = "The tool descriptor to store")]
    pub tool: ToolDescriptor,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddServerParams {
    /// Server spec in `url::type` form, type one of sse, stdio, ws
    #[serde(rename = "serverString")]
    #[schemars(description = "Server spec in url::type form (type: sse, stdio or ws)")]
    pub server_string: String,
    /// Bearer token forwarded on connects to this server
    #[serde(rename = "authToken", default)]
    #[schemars(description = "Bearer token forwarded on connects to this server")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteToolParams {
    /// Name of the tool to remove
    #[schemars(description = "Name of the tool to remove")]
    pub name: String,
}

/// Descriptors for the meta-tools, for surfacing them in a toolbox without
/// a live registry connection.
pub fn meta_tool_descriptors() -> Vec<ToolDescriptor> {
    fn schema_of<T: JsonSchema>() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| {
            serde_json::json!({ "type": "object" })
        })
    }

    vec![
        ToolDescriptor::new(
            QUERY_TOOLS,
            "Search the tool registry for tools matching a capability description",
            schema_of::<QueryToolsParams>(),
        ),
        ToolDescriptor::new(
            LIST_TOOLS,
            "List every tool known to the registry",
            serde_json::json!({ "type": "object", "properties": {} }),
        ),
        ToolDescriptor::new(
            ADD_TOOL,
            "Store a single tool descriptor in the registry",
            schema_of::<AddToolParams>(),
        ),
        ToolDescriptor::new(
            ADD_SERVER,
            "Connect to an MCP server and register every tool it advertises",
            schema_of::<AddServerParams>(),
        ),
        ToolDescriptor::new(
            DELETE_TOOL,
            "Remove a tool from the registry by name",
            schema_of::<DeleteToolParams>(),
        ),
    ]
}

/// MCP server fronting a [`ToolCatalog`].
#[derive(Clone)]
pub struct RegistryService {
    catalog: Arc<ToolCatalog>,
    tool_router: ToolRouter<Self>,
}

fn ok_result(payload: serde_json::Value, summary: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(summary.into())],
        is_error: Some(false),
        meta: Default::default(),
        structured_content: Some(payload),
    }
}

fn err_result(message: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(message.into())],
        is_error: Some(true),
        meta: Default::default(),
        structured_content: Some(serde_json::Value::Null),
    }
}

fn payload_of<T: Serialize>(value: &T) -> std::result::Result<serde_json::Value, CallToolResult> {
    serde_json::to_value(value)
        .map_err(|error| err_result(format!("failed to encode registry response: {error}")))
}

#[tool_router]
impl RegistryService {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self {
            catalog,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "query-tools",
        description = "Search the tool registry for tools matching a capability description"
    )]
    async fn query_tools(
        &self,
        Parameters(params): Parameters<QueryToolsParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        tracing::debug!(query = %params.query, limit = ?params.limit, "registry query");
        match self.catalog.query_tools(&params.query, params.limit).await {
            Ok(origins) => {
                let payload = match payload_of(&origins) {
                    Ok(payload) => payload,
                    Err(result) => return Ok(result),
                };
                let names: Vec<&str> =
                    origins.iter().map(|o| o.tool.name.as_str()).collect();
                Ok(ok_result(
                    payload,
                    format!(
                        "Found {} tool(s) for '{}': {}",
                        origins.len(),
                        params.query,
                        names.join(", ")
                    ),
                ))
            }
            Err(error) => Ok(err_result(format!("query-tools failed: {error}"))),
        }
    }

    #[tool(name = "list-tools", description = "List every tool known to the registry")]
    async fn list_tools(&self) -> std::result::Result<CallToolResult, McpError> {
        match self.catalog.list_tools(None).await {
            Ok(tools) => {
                let payload = match payload_of(&tools) {
                    Ok(payload) => payload,
                    Err(result) => return Ok(result),
                };
                Ok(ok_result(
                    payload,
                    format!("The registry knows {} tool(s)", tools.len()),
                ))
            }
            Err(error) => Ok(err_result(format!("list-tools failed: {error}"))),
        }
    }

    #[tool(
        name = "add-tool",
        description = "Store a single tool descriptor in the registry"
    )]
    async fn add_tool(
        &self,
        Parameters(params): Parameters<AddToolParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let origin = ServerDescriptor::new(LOCAL_ORIGIN_URL, TransportKind::Stdio);
        match self.catalog.add_tool(params.tool, origin).await {
            Ok(stored) => {
                let payload = match payload_of(&stored) {
                    Ok(payload) => payload,
                    Err(result) => return Ok(result),
                };
                Ok(ok_result(
                    payload,
                    format!("Stored tool '{}'", stored.name),
                ))
            }
            Err(error) => Ok(err_result(format!("add-tool failed: {error}"))),
        }
    }

    #[tool(
        name = "add-server",
        description = "Connect to an MCP server and register every tool it advertises"
    )]
    async fn add_server(
        &self,
        Parameters(params): Parameters<AddServerParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let server = match ServerDescriptor::parse_spec(&params.server_string) {
            Ok(server) => match params.auth_token {
                Some(token) => server.with_auth_token(token),
                None => server,
            },
            Err(error) => return Ok(err_result(format!("add-server failed: {error}"))),
        };

        tracing::info!(server = %server.id(), "registering server");
        match self.catalog.add_server(server).await {
            Ok(added) => {
                let payload = match payload_of(&added) {
                    Ok(payload) => payload,
                    Err(result) => return Ok(result),
                };
                let names: Vec<&str> = added.iter().map(|t| t.name.as_str()).collect();
                Ok(ok_result(
                    payload,
                    format!("Added {} tool(s): {}", added.len(), names.join(", ")),
                ))
            }
            Err(error) => Ok(err_result(format!("add-server failed: {error}"))),
        }
    }

    #[tool(name = "delete-tool", description = "Remove a tool from the registry by name")]
    async fn delete_tool(
        &self,
        Parameters(params): Parameters<DeleteToolParams>,
    ) -> std::result::Result<CallToolResult, McpError> {
        match self.catalog.delete_tool(&params.name).await {
            Ok(deleted) => {
                let summary = if deleted {
                    format!("Deleted tool '{}'", params.name)
                } else {
                    format!("No tool named '{}' was registered", params.name)
                };
                Ok(ok_result(serde_json::json!(deleted), summary))
            }
            Err(error) => Ok(err_result(format!("delete-tool failed: {error}"))),
        }
    }
}

#[tool_handler]
impl rmcp::ServerHandler for RegistryService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Tool registry. Query it to discover tools relevant to a task, \
                 register new servers, or prune stale entries. Discovered tools \
                 are returned with their origin server so clients can connect \
                 lazily."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Serve the registry on stdio (stdout carries the protocol; log to
/// stderr).
pub async fn serve_stdio(catalog: Arc<ToolCatalog>) -> CrateResult<()> {
    use rmcp::{transport::stdio, ServiceExt};

    let service = RegistryService::new(catalog)
        .serve(stdio())
        .await
        .map_err(|error| ToolgateError::Transport(format!("registry serve failed: {error}")))?;
    tracing::info!("registry serving on stdio");
    service
        .waiting()
        .await
        .map_err(|error| ToolgateError::Transport(format!("registry stopped: {error}")))?;
    Ok(())
}
