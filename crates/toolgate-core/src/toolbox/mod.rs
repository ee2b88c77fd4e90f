//! The active tool surface: known tools, uniqueness, lazy dispatch.
//!
//! Registry meta-tools always win dispatch over upstream tools of the same
//! name. Upstream connections are opened only when a tool is actually
//! invoked, through the shared pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::conversation::ContentBlock;
use crate::error::{Result, ToolConflict, ToolgateError};
use crate::mcp::{default_connector, ClientPool, Connector, ToolCallOutcome};
use crate::registry::{RegistryClient, META_TOOL_NAMES};
use crate::types::{ResultChunk, ServerDescriptor, ToolDescriptor, ToolOrigin};

#[derive(Debug, Deserialize)]
struct QueryToolsArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

/// Catalogue of currently-known tools plus dispatch to their origins.
pub struct Toolbox {
    /// Insertion-ordered tool surface shown to the model.
    tools: Vec<ToolDescriptor>,
    origins: HashMap<String, ServerDescriptor>,
    pool: Arc<ClientPool>,
    registry: Arc<RegistryClient>,
    connector: Connector,
    call_deadline: Option<Duration>,
}

impl Toolbox {
    pub fn new(pool: Arc<ClientPool>, registry: Arc<RegistryClient>) -> Self {
        Self {
            tools: Vec::new(),
            origins: HashMap::new(),
            pool,
            registry,
            connector: default_connector(),
            call_deadline: None,
        }
    }

    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }

    /// Deadline applied to each upstream tool call.
    pub fn with_call_deadline(mut self, deadline: Duration) -> Self {
        self.call_deadline = Some(deadline);
        self
    }

    /// Locally-known tools in insertion order, then the registry's
    /// meta-tools. Stable across calls within a turn.
    pub fn available_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools = self.tools.clone();
        tools.extend(self.registry.meta_tools());
        tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.origins.contains_key(name)
    }

    pub fn origin_of(&self, name: &str) -> Option<&ServerDescriptor> {
        self.origins.get(name)
    }

    /// Eager path: connect now, list the server's tools, and install them.
    ///
    /// Name conflicts with a *different* origin reject the whole batch with
    /// a compound error; re-registering the same server is a no-op.
    pub async fn connect_to_server(
        &mut self,
        server: ServerDescriptor,
    ) -> Result<Vec<ToolDescriptor>> {
        let client = self.pool.acquire_for(&server, &self.connector).await?;
        let advertised = client.lock().await.list_tools().await?;

        let origins = advertised
            .into_iter()
            .map(|tool| ToolOrigin::new(tool, server.clone()))
            .collect();
        self.install(origins)
    }

    /// Lazy path: record descriptors and origins; no connection is opened.
    pub fn register_tools(&mut self, origins: Vec<ToolOrigin>) -> Result<Vec<String>> {
        self.install(origins)
            .map(|installed| installed.into_iter().map(|tool| tool.name).collect())
    }

    /// Install a batch atomically: either every non-duplicate entry goes
    /// in, or none do.
    fn install(&mut self, origins: Vec<ToolOrigin>) -> Result<Vec<ToolDescriptor>> {
        let mut conflicts: Vec<ToolConflict> = Vec::new();
        for origin in &origins {
            if let Some(existing) = self.origins.get(&origin.tool.name) {
                if existing.id() != origin.server.id() {
                    conflicts.push(ToolConflict {
                        name: origin.tool.name.clone(),
                        existing_origin: existing.id(),
                        incoming_origin: origin.server.id(),
                    });
                }
            }
        }
        if !conflicts.is_empty() {
            return Err(ToolgateError::registration(&conflicts));
        }

        let mut installed = Vec::new();
        for origin in origins {
            if self.origins.contains_key(&origin.tool.name) {
                // Same origin advertising the same name again.
                continue;
            }
            self.origins
                .insert(origin.tool.name.clone(), origin.server);
            self.tools.push(origin.tool.clone());
            installed.push(origin.tool);
        }
        Ok(installed)
    }

    /// Dispatch one tool use and wrap the outcome as a `ToolResult` block.
    /// Failures never raise; they produce error-flagged results the model
    /// can react to.
    pub async fn execute_tool(
        &mut self,
        tool_use_id: &str,
        name: &str,
        args: &serde_json::Value,
    ) -> ContentBlock {
        // Registry names win over any upstream tool of the same name.
        if META_TOOL_NAMES.contains(&name) {
            return self.execute_meta_tool(tool_use_id, name, args).await;
        }

        let Some(server) = self.origins.get(name).cloned() else {
            return error_result(
                tool_use_id,
                format!("unknown tool '{name}'; query the registry to discover tools"),
            );
        };

        match self.call_upstream(&server, name, args).await {
            Ok(outcome) => ContentBlock::ToolResult {
                tool_use_id: tool_use_id.to_string(),
                content: outcome.content,
                is_error: outcome.is_error,
            },
            Err(error) => {
                if matches!(error, ToolgateError::Transport(_)) {
                    // Drop the broken client; the next call reconnects.
                    self.pool.discard(&server.key());
                }
                error_result(tool_use_id, format!("tool '{name}' failed: {error}"))
            }
        }
    }

    async fn call_upstream(
        &self,
        server: &ServerDescriptor,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<ToolCallOutcome> {
        let client = self.pool.acquire_for(server, &self.connector).await?;
        let mut client = client.lock().await;
        match self.call_deadline {
            Some(deadline) => {
                client
                    .call_tool_with_deadline(name, args.clone(), deadline)
                    .await
            }
            None => client.call_tool(name, args.clone()).await,
        }
    }

    async fn execute_meta_tool(
        &mut self,
        tool_use_id: &str,
        name: &str,
        args: &serde_json::Value,
    ) -> ContentBlock {
        if name == crate::registry::service::QUERY_TOOLS {
            return self.execute_query_tools(tool_use_id, args).await;
        }

        match self.registry.call_meta(name, args.clone()).await {
            Ok(outcome) => ContentBlock::ToolResult {
                tool_use_id: tool_use_id.to_string(),
                content: outcome.content,
                is_error: outcome.is_error,
            },
            Err(error) => error_result(tool_use_id, format!("{name} failed: {error}")),
        }
    }

    /// `query-tools` grows the toolbox: returned origins are registered for
    /// lazy use, and the model sees a short summary instead of the raw
    /// payload to conserve prompt context.
    async fn execute_query_tools(
        &mut self,
        tool_use_id: &str,
        args: &serde_json::Value,
    ) -> ContentBlock {
        let parsed: QueryToolsArgs = match serde_json::from_value(args.clone()) {
            Ok(parsed) => parsed,
            Err(error) => {
                return error_result(
                    tool_use_id,
                    format!("query-tools arguments failed to parse: {error}"),
                )
            }
        };

        let outcome = match self
            .registry
            .query_tools(&parsed.query, parsed.limit)
            .await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                return error_result(tool_use_id, format!("query-tools failed: {error}"))
            }
        };

        let names: Vec<String> = outcome
            .value
            .iter()
            .map(|origin| origin.tool.name.clone())
            .collect();

        match self.register_tools(outcome.value) {
            Ok(_) => {
                let summary = if names.is_empty() {
                    format!("no tools matched '{}'", parsed.query)
                } else {
                    format!("successfully queried and added {}", names.join(", "))
                };
                ContentBlock::ToolResult {
                    tool_use_id: tool_use_id.to_string(),
                    content: vec![ResultChunk::text(summary)],
                    is_error: false,
                }
            }
            Err(error) => error_result(
                tool_use_id,
                format!("query-tools found {} but registration failed: {error}", names.join(", ")),
            ),
        }
    }
}

fn error_result(tool_use_id: &str, message: String) -> ContentBlock {
    ContentBlock::ToolResult {
        tool_use_id: tool_use_id.to_string(),
        content: vec![ResultChunk::text(message)],
        is_error: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ToolCatalog;
    use crate::mcp::test_support::{scripted_running_service, ScriptedBehavior};
    use crate::mcp::McpClient;
    use crate::mcp::connect_in_process;
    use crate::registry::service::RegistryService;
    use crate::types::TransportKind;

    fn server(url: &str) -> ServerDescriptor {
        ServerDescriptor::new(url, TransportKind::Sse)
    }

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, format!("{name} tool"), serde_json::json!({}))
    }

    fn origin(tool_name: &str, server_url: &str) -> ToolOrigin {
        ToolOrigin::new(tool(tool_name), server(server_url))
    }

    /// Toolbox whose registry is served in-process over the given catalog
    /// and whose upstream connector produces scripted clients.
    fn toolbox_with_catalog(catalog: Arc<ToolCatalog>, pool: Arc<ClientPool>) -> Toolbox {
        let registry_connector: Connector = Arc::new(move |_server| {
            let catalog = Arc::clone(&catalog);
            Box::pin(async move { connect_in_process(RegistryService::new(catalog)).await })
        });
        let registry = Arc::new(
            RegistryClient::new(server("registry://meta"), Arc::clone(&pool))
                .with_connector(registry_connector),
        );

        let upstream_connector: Connector = Arc::new(|_server| {
            Box::pin(async {
                let mut client = McpClient::from_running_service(scripted_running_service(
                    ScriptedBehavior::CallTool,
                ));
                client.initialize().await?;
                Ok(client)
            })
        });
        Toolbox::new(pool, registry).with_connector(upstream_connector)
    }

    fn toolbox() -> Toolbox {
        let pool = Arc::new(ClientPool::default());
        let catalog = Arc::new(ToolCatalog::in_memory(Arc::clone(&pool)));
        toolbox_with_catalog(catalog, pool)
    }

    #[test]
    fn available_tools_lists_locals_then_meta_tools() {
        let mut toolbox = toolbox();
        toolbox
            .register_tools(vec![origin("weather", "sse://w"), origin("search", "sse://s")])
            .expect("register");

        let names: Vec<String> = toolbox
            .available_tools()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(&names[..2], &["weather", "search"]);
        assert_eq!(&names[2..], &META_TOOL_NAMES);
    }

    #[test]
    fn register_tools_is_lazy_and_opens_no_connection() {
        let pool = Arc::new(ClientPool::default());
        let catalog = Arc::new(ToolCatalog::in_memory(Arc::clone(&pool)));
        let mut toolbox = toolbox_with_catalog(catalog, Arc::clone(&pool));

        toolbox
            .register_tools(vec![origin("weather", "sse://w")])
            .expect("register");
        assert!(toolbox.contains("weather"));
        assert_eq!(pool.size(), 0, "lazy registration must not connect");
    }

    #[test]
    fn duplicate_name_from_different_origin_rejects_whole_batch() {
        let mut toolbox = toolbox();
        toolbox
            .register_tools(vec![origin("search", "sse://one")])
            .expect("register");

        let err = toolbox
            .register_tools(vec![origin("fetch", "sse://two"), origin("search", "sse://two")])
            .expect_err("conflicting batch must be rejected");

        match &err {
            ToolgateError::Registration { summary, names } => {
                assert_eq!(names, &vec!["search".to_string()]);
                assert!(summary.contains("sse://one::sse"));
                assert!(summary.contains("sse://two::sse"));
            }
            other => panic!("expected registration error, got {other:?}"),
        }

        // Atomic: the non-conflicting entry did not sneak in.
        assert!(!toolbox.contains("fetch"));
        assert_eq!(
            toolbox.origin_of("search").map(|s| s.url.as_str()),
            Some("sse://one")
        );
    }

    #[test]
    fn same_origin_reregistration_is_a_noop() {
        let mut toolbox = toolbox();
        toolbox
            .register_tools(vec![origin("weather", "sse://w")])
            .expect("register");
        let added = toolbox
            .register_tools(vec![origin("weather", "sse://w")])
            .expect("re-register");
        assert!(added.is_empty());
        assert_eq!(toolbox.available_tools().len(), 1 + META_TOOL_NAMES.len());
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_result_without_raising() {
        let mut toolbox = toolbox();
        let block = toolbox
            .execute_tool("tu_1", "nonexistent", &serde_json::json!({}))
            .await;
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "tu_1");
                assert!(is_error);
                assert!(content[0].text.contains("nonexistent"));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upstream_dispatch_connects_lazily_and_preserves_content() {
        let pool = Arc::new(ClientPool::default());
        let catalog = Arc::new(ToolCatalog::in_memory(Arc::clone(&pool)));
        let mut toolbox = toolbox_with_catalog(catalog, Arc::clone(&pool));

        toolbox
            .register_tools(vec![origin("weather", "sse://w")])
            .expect("register");
        assert_eq!(pool.size(), 0);

        let block = toolbox
            .execute_tool("tu_1", "weather", &serde_json::json!({"city": "Paris"}))
            .await;
        match block {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(!is_error);
                assert!(content.iter().any(|c| c.text.contains("tool ok")));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
        assert_eq!(pool.size(), 1, "first call opens the connection");
        assert!(pool.contains(&server("sse://w").key()));
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_error_result() {
        let pool = Arc::new(ClientPool::default());
        let catalog = Arc::new(ToolCatalog::in_memory(Arc::clone(&pool)));
        let mut toolbox = toolbox_with_catalog(catalog, Arc::clone(&pool));
        toolbox.connector = Arc::new(|_server| {
            Box::pin(async { Err(ToolgateError::Transport("connection refused".into())) })
        });

        toolbox
            .register_tools(vec![origin("weather", "sse://down")])
            .expect("register");

        let block = toolbox
            .execute_tool("tu_1", "weather", &serde_json::json!({}))
            .await;
        match block {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert!(content[0].text.contains("connection refused"));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_deadline_turns_stalls_into_error_results() {
        let pool = Arc::new(ClientPool::default());
        let catalog = Arc::new(ToolCatalog::in_memory(Arc::clone(&pool)));
        let mut toolbox = toolbox_with_catalog(catalog, pool)
            .with_call_deadline(Duration::from_millis(25));
        toolbox.connector = Arc::new(|_server| {
            Box::pin(async {
                let mut client = McpClient::from_running_service(scripted_running_service(
                    ScriptedBehavior::NeverReply,
                ));
                client.initialize().await?;
                Ok(client)
            })
        });

        toolbox
            .register_tools(vec![origin("weather", "sse://slow")])
            .expect("register");

        let block = toolbox
            .execute_tool("tu_1", "weather", &serde_json::json!({}))
            .await;
        match block {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(is_error);
                assert!(content[0].text.contains("Timeout"));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_tools_registers_results_and_summarizes() {
        let pool = Arc::new(ClientPool::default());
        let catalog = Arc::new(ToolCatalog::in_memory(Arc::clone(&pool)));
        catalog
            .add_tool(
                ToolDescriptor::new(
                    "weather",
                    "look up the weather forecast for a city",
                    serde_json::json!({"type": "object"}),
                ),
                server("sse://w"),
            )
            .await
            .expect("seed catalog");
        let mut toolbox = toolbox_with_catalog(catalog, Arc::clone(&pool));

        let block = toolbox
            .execute_tool("tu_1", "query-tools", &serde_json::json!({"query": "weather"}))
            .await;
        match block {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(!is_error);
                assert_eq!(content.len(), 1);
                assert_eq!(content[0].text, "successfully queried and added weather");
                assert!(!content[0].is_json, "summary replaces the raw payload");
            }
            other => panic!("expected tool result, got {other:?}"),
        }

        // The origin is now registered for lazy use.
        assert!(toolbox.contains("weather"));
        assert_eq!(
            toolbox.origin_of("weather").map(|s| s.url.as_str()),
            Some("sse://w")
        );
    }

    #[tokio::test]
    async fn other_meta_tools_pass_raw_json_through() {
        let pool = Arc::new(ClientPool::default());
        let catalog = Arc::new(ToolCatalog::in_memory(Arc::clone(&pool)));
        catalog
            .add_tool(tool("weather"), server("sse://w"))
            .await
            .expect("seed catalog");
        let mut toolbox = toolbox_with_catalog(catalog, pool);

        let block = toolbox
            .execute_tool("tu_1", "list-tools", &serde_json::json!({}))
            .await;
        match block {
            ContentBlock::ToolResult {
                content, is_error, ..
            } => {
                assert!(!is_error);
                assert!(
                    content.iter().any(|c| c.is_json && c.text.contains("weather")),
                    "raw JSON payload flows back for list-tools"
                );
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn meta_tool_name_wins_over_upstream_registration() {
        let mut toolbox = toolbox();
        // An upstream server claims the meta name; dispatch still routes to
        // the registry.
        toolbox
            .register_tools(vec![origin("list-tools", "sse://rogue")])
            .expect("register");

        let block = toolbox
            .execute_tool("tu_1", "list-tools", &serde_json::json!({}))
            .await;
        match block {
            ContentBlock::ToolResult { content, is_error, .. } => {
                assert!(!is_error);
                assert!(content.iter().any(|c| c.is_json));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_query_tools_args_yield_error_result() {
        let mut toolbox = toolbox();
        let block = toolbox
            .execute_tool("tu_1", "query-tools", &serde_json::json!({"nope": 1}))
            .await;
        match block {
            ContentBlock::ToolResult { is_error, .. } => assert!(is_error),
            other => panic!("expected tool result, got {other:?}"),
        }
    }
}
