//! Typed adapter over an MCP client targeting a registry service.
//!
//! Each meta-operation locates the JSON-marked chunk of the response,
//! parses it, and returns both the typed value and the raw JSON string —
//! the raw string is what flows back to the LLM as uninterpreted evidence.

use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use super::service;
use crate::error::{Result, ToolgateError};
use crate::mcp::{default_connector, ClientPool, Connector, SharedClient, ToolCallOutcome};
use crate::types::{ServerDescriptor, ToolDescriptor, ToolOrigin};

/// A parsed meta-operation result plus the raw JSON it came from.
#[derive(Debug, Clone)]
pub struct MetaOutcome<T> {
    pub value: T,
    pub raw_json: String,
}

/// Client for a registry service, connected lazily through the pool.
pub struct RegistryClient {
    server: ServerDescriptor,
    pool: Arc<ClientPool>,
    connector: Connector,
    /// Snapshot of the registry's own tool surface, for dispatch routing.
    meta_tools: RwLock<Vec<ToolDescriptor>>,
}

impl RegistryClient {
    pub fn new(server: ServerDescriptor, pool: Arc<ClientPool>) -> Self {
        Self {
            server,
            pool,
            connector: default_connector(),
            meta_tools: RwLock::new(Vec::new()),
        }
    }

    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }

    pub fn server(&self) -> &ServerDescriptor {
        &self.server
    }

    /// Current snapshot of the registry's advertised tools. Falls back to
    /// the built-in descriptors before the first refresh.
    pub fn meta_tools(&self) -> Vec<ToolDescriptor> {
        let snapshot = self
            .meta_tools
            .read()
            .expect("meta tool lock should not be poisoned");
        if snapshot.is_empty() {
            service::meta_tool_descriptors()
        } else {
            snapshot.clone()
        }
    }

    /// Re-list the registry's own tools and update the snapshot.
    pub async fn refresh_meta_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let client = self.client().await?;
        let tools = client.lock().await.list_tools().await?;
        *self
            .meta_tools
            .write()
            .expect("meta tool lock should not be poisoned") = tools.clone();
        Ok(tools)
    }

    /// Raw meta-tool invocation; used by the toolbox for pass-through
    /// dispatch.
    pub async fn call_meta(&self, name: &str, args: serde_json::Value) -> Result<ToolCallOutcome> {
        let client = self.client().await?;
        let outcome = client.lock().await.call_tool(name, args).await;
        if let Err(error) = &outcome {
            if matches!(error, ToolgateError::Transport(_)) {
                self.pool.discard(&self.server.key());
            }
        }
        outcome
    }

    pub async fn query_tools(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<MetaOutcome<Vec<ToolOrigin>>> {
        let mut args = serde_json::json!({ "query": query });
        if let Some(limit) = limit {
            args["limit"] = serde_json::json!(limit);
        }
        let outcome = self.call_meta(service::QUERY_TOOLS, args).await?;
        parse_meta_outcome(service::QUERY_TOOLS, &outcome)
    }

    pub async fn list_tools(&self) -> Result<MetaOutcome<Vec<ToolDescriptor>>> {
        let outcome = self
            .call_meta(service::LIST_TOOLS, serde_json::json!({}))
            .await?;
        parse_meta_outcome(service::LIST_TOOLS, &outcome)
    }

    pub async fn add_tool(&self, tool: &ToolDescriptor) -> Result<MetaOutcome<ToolDescriptor>> {
        let outcome = self
            .call_meta(
                service::ADD_TOOL,
                serde_json::json!({ "tool": tool }),
            )
            .await?;
        parse_meta_outcome(service::ADD_TOOL, &outcome)
    }

    pub async fn add_server(
        &self,
        server_string: &str,
        auth_token: Option<&str>,
    ) -> Result<MetaOutcome<Vec<ToolDescriptor>>> {
        let mut args = serde_json::json!({ "serverString": server_string });
        if let Some(token) = auth_token {
            args["authToken"] = serde_json::json!(token);
        }
        let outcome = self.call_meta(service::ADD_SERVER, args).await?;
        parse_meta_outcome(service::ADD_SERVER, &outcome)
    }

    pub async fn delete_tool(&self, name: &str) -> Result<MetaOutcome<bool>> {
        let outcome = self
            .call_meta(service::DELETE_TOOL, serde_json::json!({ "name": name }))
            .await?;
        parse_meta_outcome(service::DELETE_TOOL, &outcome)
    }

    async fn client(&self) -> Result<SharedClient> {
        self.pool.acquire_for(&self.server, &self.connector).await
    }
}

/// Pick the JSON-marked chunk out of a meta-tool response and parse it.
fn parse_meta_outcome<T: DeserializeOwned>(
    operation: &str,
    outcome: &ToolCallOutcome,
) -> Result<MetaOutcome<T>> {
    if outcome.is_error {
        return Err(ToolgateError::ToolExecution {
            tool_name: operation.to_string(),
            message: outcome.joined_text(),
        });
    }
    let chunk = outcome.json_chunk().ok_or_else(|| {
        ToolgateError::Protocol(format!(
            "{operation}: registry response carries no JSON block"
        ))
    })?;
    let value = serde_json::from_str(&chunk.text).map_err(|error| {
        ToolgateError::Protocol(format!(
            "{operation}: registry payload failed to parse: {error}"
        ))
    })?;
    Ok(MetaOutcome {
        value,
        raw_json: chunk.text.clone(),
    })
}
