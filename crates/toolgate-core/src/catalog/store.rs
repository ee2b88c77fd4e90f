//! Pluggable storage for tool origins.
//!
//! The logical model is a map from `(server id, tool name)` to
//! [`ToolOrigin`]. [`MemoryToolStore`] keeps it in process; the document
//! variant stores each origin under `"{server.url}-{tool.name}"` in any
//! [`DocumentStore`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ToolOrigin;

/// Storage contract for the catalogue.
#[async_trait]
pub trait ToolStore: Send + Sync {
    /// Insert or replace the origin keyed by `(server id, tool name)`.
    async fn upsert(&mut self, origin: ToolOrigin) -> Result<()>;

    async fn upsert_batch(&mut self, origins: Vec<ToolOrigin>) -> Result<()> {
        for origin in origins {
            self.upsert(origin).await?;
        }
        Ok(())
    }

    /// Remove every origin carrying this tool name. Returns whether any
    /// entry existed.
    async fn delete_by_name(&mut self, name: &str) -> Result<bool>;

    /// Resolve tool names to origins, preserving input order with `None`
    /// for misses.
    async fn get_batch(&self, names: &[String]) -> Result<Vec<Option<ToolOrigin>>>;

    /// Enumerate up to `limit` origins in a stable order.
    async fn scan(&self, limit: usize) -> Result<Vec<ToolOrigin>>;
}

/// In-process store; insertion order is the scan order.
#[derive(Default)]
pub struct MemoryToolStore {
    entries: Vec<ToolOrigin>,
}

impl MemoryToolStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolStore for MemoryToolStore {
    async fn upsert(&mut self, origin: ToolOrigin) -> Result<()> {
        let slot = self.entries.iter_mut().find(|existing| {
            existing.server.id() == origin.server.id() && existing.tool.name == origin.tool.name
        });
        match slot {
            Some(existing) => *existing = origin,
            None => self.entries.push(origin),
        }
        Ok(())
    }

    async fn delete_by_name(&mut self, name: &str) -> Result<bool> {
        let before = self.entries.len();
        self.entries.retain(|origin| origin.tool.name != name);
        Ok(self.entries.len() != before)
    }

    async fn get_batch(&self, names: &[String]) -> Result<Vec<Option<ToolOrigin>>> {
        Ok(names
            .iter()
            .map(|name| {
                self.entries
                    .iter()
                    .find(|origin| origin.tool.name == *name)
                    .cloned()
            })
            .collect())
    }

    async fn scan(&self, limit: usize) -> Result<Vec<ToolOrigin>> {
        Ok(self.entries.iter().take(limit).cloned().collect())
    }
}

/// Key-value JSON document store contract (the optional persistence
/// surface). Batch get preserves input order and yields `None` for misses;
/// scan is bounded.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn set_json(&self, key: &str, value: serde_json::Value) -> Result<()>;
    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn get_json_batch(&self, keys: &[String]) -> Result<Vec<Option<serde_json::Value>>>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn scan(&self, limit: usize) -> Result<Vec<serde_json::Value>>;
}

/// In-memory document store backing tests; key order is the scan order.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn set_json(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.documents
            .lock()
            .expect("document mutex should lock")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .documents
            .lock()
            .expect("document mutex should lock")
            .get(key)
            .cloned())
    }

    async fn get_json_batch(&self, keys: &[String]) -> Result<Vec<Option<serde_json::Value>>> {
        let documents = self.documents.lock().expect("document mutex should lock");
        Ok(keys.iter().map(|key| documents.get(key).cloned()).collect())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .documents
            .lock()
            .expect("document mutex should lock")
            .remove(key)
            .is_some())
    }

    async fn scan(&self, limit: usize) -> Result<Vec<serde_json::Value>> {
        Ok(self
            .documents
            .lock()
            .expect("document mutex should lock")
            .values()
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Tool store over any [`DocumentStore`], one JSON document per origin.
pub struct DocumentToolStore<D: DocumentStore> {
    documents: D,
}

impl<D: DocumentStore> DocumentToolStore<D> {
    pub fn new(documents: D) -> Self {
        Self { documents }
    }

    async fn scan_origins(&self, limit: usize) -> Result<Vec<ToolOrigin>> {
        let values = self.documents.scan(limit).await?;
        let mut origins = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_value::<ToolOrigin>(value) {
                Ok(origin) => origins.push(origin),
                Err(error) => tracing::warn!(%error, "skipping malformed stored tool origin"),
            }
        }
        Ok(origins)
    }
}

#[async_trait]
impl<D: DocumentStore> ToolStore for DocumentToolStore<D> {
    async fn upsert(&mut self, origin: ToolOrigin) -> Result<()> {
        let key = origin.storage_key();
        self.documents
            .set_json(&key, serde_json::to_value(&origin)?)
            .await
    }

    async fn delete_by_name(&mut self, name: &str) -> Result<bool> {
        // Keys embed the server url, so name deletion walks the store.
        let origins = self.scan_origins(usize::MAX).await?;
        let mut deleted = false;
        for origin in origins.iter().filter(|o| o.tool.name == name) {
            deleted |= self.documents.delete(&origin.storage_key()).await?;
        }
        Ok(deleted)
    }

    async fn get_batch(&self, names: &[String]) -> Result<Vec<Option<ToolOrigin>>> {
        let origins = self.scan_origins(usize::MAX).await?;
        Ok(names
            .iter()
            .map(|name| {
                origins
                    .iter()
                    .find(|origin| origin.tool.name == *name)
                    .cloned()
            })
            .collect())
    }

    async fn scan(&self, limit: usize) -> Result<Vec<ToolOrigin>> {
        self.scan_origins(limit).await
    }
}
