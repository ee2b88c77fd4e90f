//! The registry's storage core: a vector-indexed catalogue of tool
//! origins.
//!
//! Single-writer multi-reader: mutations take the write lock, queries the
//! read lock. The index is rebuilt under the write lock on delete.

pub mod index;
pub mod store;

pub use index::{Embedder, HashEmbedder, SimilarityIndex};
pub use store::{
    DocumentStore, DocumentToolStore, MemoryDocumentStore, MemoryToolStore, ToolStore,
};

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Result, ToolgateError};
use crate::mcp::{default_connector, ClientPool, Connector};
use crate::types::{ServerDescriptor, ToolDescriptor, ToolOrigin};

/// Appended to every similarity query to bias recall toward
/// authorization/connection helpers.
pub const QUERY_BIAS_SUFFIX: &str = "Additionally, any relevant connection tools";

pub const DEFAULT_QUERY_LIMIT: usize = 10;
pub const DEFAULT_LIST_LIMIT: usize = 100;

struct CatalogInner {
    store: Box<dyn ToolStore>,
    index: SimilarityIndex,
    servers: Vec<ServerDescriptor>,
}

/// Catalogue of `(tool, origin server)` pairs with similarity search.
pub struct ToolCatalog {
    inner: RwLock<CatalogInner>,
    pool: Arc<ClientPool>,
    connector: Connector,
}

impl ToolCatalog {
    pub fn new(
        store: Box<dyn ToolStore>,
        embedder: Arc<dyn Embedder>,
        pool: Arc<ClientPool>,
    ) -> Self {
        Self {
            inner: RwLock::new(CatalogInner {
                store,
                index: SimilarityIndex::new(embedder),
                servers: Vec::new(),
            }),
            pool,
            connector: default_connector(),
        }
    }

    /// In-process catalogue: memory store plus the hashing embedder.
    pub fn in_memory(pool: Arc<ClientPool>) -> Self {
        Self::new(
            Box::new(MemoryToolStore::new()),
            Arc::new(HashEmbedder::default()),
            pool,
        )
    }

    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }

    /// Upsert one tool under its origin and (re)index it.
    pub async fn add_tool(
        &self,
        tool: ToolDescriptor,
        server: ServerDescriptor,
    ) -> Result<ToolDescriptor> {
        let mut inner = self.inner.write().await;
        inner
            .index
            .upsert(&tool.name, &tool.index_text())
            .await?;
        inner
            .store
            .upsert(ToolOrigin::new(tool.clone(), server))
            .await?;
        Ok(tool)
    }

    /// Connect to a server, list its tools, and add each one.
    ///
    /// The server is recorded even when an individual add fails; the first
    /// failure is surfaced after every tool has been attempted.
    pub async fn add_server(&self, server: ServerDescriptor) -> Result<Vec<ToolDescriptor>> {
        let client = self.pool.acquire_for(&server, &self.connector).await?;
        let tools = client.lock().await.list_tools().await?;

        let mut inner = self.inner.write().await;
        if !inner.servers.iter().any(|known| known.id() == server.id()) {
            inner.servers.push(server.clone());
        }

        let mut added = Vec::with_capacity(tools.len());
        let mut first_error: Option<ToolgateError> = None;
        for tool in tools {
            let indexed = inner.index.upsert(&tool.name, &tool.index_text()).await;
            let stored = match indexed {
                Ok(()) => {
                    inner
                        .store
                        .upsert(ToolOrigin::new(tool.clone(), server.clone()))
                        .await
                }
                Err(error) => Err(error),
            };
            match stored {
                Ok(()) => added.push(tool),
                Err(error) => {
                    tracing::warn!(tool = %tool.name, %error, "failed to add advertised tool");
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(added),
        }
    }

    /// Remove a tool by name, rebuilding the index without it.
    pub async fn delete_tool(&self, name: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let deleted = inner.store.delete_by_name(name).await?;
        if deleted {
            let remaining = inner.store.scan(usize::MAX).await?;
            let items: Vec<(String, String)> = remaining
                .iter()
                .map(|origin| (origin.tool.name.clone(), origin.tool.index_text()))
                .collect();
            inner.index.rebuild(&items).await?;
        }
        Ok(deleted)
    }

    /// Similarity search returning up to `limit` origins.
    pub async fn query_tools(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ToolOrigin>> {
        let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        let biased = format!("{query}. {QUERY_BIAS_SUFFIX}");

        let inner = self.inner.read().await;
        let hits = inner.index.search(&biased, limit).await?;
        let names: Vec<String> = hits.into_iter().map(|(name, _)| name).collect();
        let origins = inner.store.get_batch(&names).await?;
        Ok(origins.into_iter().flatten().collect())
    }

    /// Enumerate known tools.
    pub async fn list_tools(&self, limit: Option<usize>) -> Result<Vec<ToolDescriptor>> {
        let inner = self.inner.read().await;
        let origins = inner
            .store
            .scan(limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await?;
        Ok(origins.into_iter().map(|origin| origin.tool).collect())
    }

    /// Servers seen by `add_server`.
    pub async fn known_servers(&self) -> Vec<ServerDescriptor> {
        self.inner.read().await.servers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::test_support::{scripted_running_service, ScriptedBehavior};
    use crate::mcp::McpClient;
    use crate::types::TransportKind;

    fn catalog() -> ToolCatalog {
        ToolCatalog::in_memory(Arc::new(ClientPool::default()))
    }

    fn tool(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, description, serde_json::json!({"type": "object"}))
    }

    fn server(url: &str) -> ServerDescriptor {
        ServerDescriptor::new(url, TransportKind::Sse)
    }

    #[tokio::test]
    async fn add_then_query_returns_origin() {
        let catalog = catalog();
        catalog
            .add_tool(tool("weather", "look up the weather for a city"), server("sse://w"))
            .await
            .expect("add_tool");

        let origins = catalog
            .query_tools("weather", None)
            .await
            .expect("query_tools");
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0].tool.name, "weather");
        assert_eq!(origins[0].server.url, "sse://w");
    }

    #[tokio::test]
    async fn delete_tool_hides_it_from_every_query() {
        let catalog = catalog();
        catalog
            .add_tool(tool("weather", "weather forecast"), server("sse://w"))
            .await
            .expect("add_tool");
        catalog
            .add_tool(tool("search", "document search"), server("sse://s"))
            .await
            .expect("add_tool");

        assert!(catalog.delete_tool("weather").await.expect("delete_tool"));

        for query in ["weather", "forecast", "anything at all"] {
            let origins = catalog.query_tools(query, None).await.expect("query");
            assert!(
                origins.iter().all(|o| o.tool.name != "weather"),
                "deleted tool leaked for query {query:?}"
            );
        }
    }

    #[tokio::test]
    async fn delete_tool_returns_false_for_unknown_name() {
        let catalog = catalog();
        assert!(!catalog.delete_tool("ghost").await.expect("delete_tool"));
    }

    #[tokio::test]
    async fn list_tools_respects_limit() {
        let catalog = catalog();
        for i in 0..4 {
            catalog
                .add_tool(tool(&format!("tool{i}"), "a tool"), server("sse://x"))
                .await
                .expect("add_tool");
        }
        assert_eq!(
            catalog.list_tools(Some(2)).await.expect("list_tools").len(),
            2
        );
        assert_eq!(catalog.list_tools(None).await.expect("list_tools").len(), 4);
    }

    #[tokio::test]
    async fn query_limit_bounds_results() {
        let catalog = catalog();
        for i in 0..5 {
            catalog
                .add_tool(
                    tool(&format!("conn{i}"), "connection helper tool"),
                    server("sse://x"),
                )
                .await
                .expect("add_tool");
        }
        let origins = catalog
            .query_tools("connection helper", Some(3))
            .await
            .expect("query_tools");
        assert_eq!(origins.len(), 3);
    }

    #[tokio::test]
    async fn add_server_lists_and_registers_advertised_tools() {
        let weather = server("sse://w");
        let connector: Connector = Arc::new(|_server| {
            Box::pin(async {
                let mut client = McpClient::from_running_service(scripted_running_service(
                    ScriptedBehavior::ListTools {
                        tool_name: "weather".into(),
                    },
                ));
                client.initialize().await?;
                Ok(client)
            })
        });
        let pool = Arc::new(ClientPool::default());
        let catalog = ToolCatalog::in_memory(Arc::clone(&pool)).with_connector(connector);

        let added = catalog
            .add_server(weather.clone())
            .await
            .expect("add_server");
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].name, "weather");
        assert_eq!(pool.size(), 1, "connection goes through the pool");
        assert_eq!(catalog.known_servers().await, vec![weather.clone()]);

        let origins = catalog.query_tools("weather", None).await.expect("query");
        assert_eq!(origins[0].server, weather);
    }

    #[tokio::test]
    async fn add_server_connection_failure_propagates() {
        let connector: Connector = Arc::new(|_server| {
            Box::pin(async {
                Err(ToolgateError::Transport("connection refused".into()))
            })
        });
        let catalog = ToolCatalog::in_memory(Arc::new(ClientPool::default()))
            .with_connector(connector);

        let err = catalog
            .add_server(server("sse://down"))
            .await
            .expect_err("connect failure should surface");
        assert!(matches!(err, ToolgateError::Transport(_)));
        assert!(catalog.known_servers().await.is_empty());
    }
}
