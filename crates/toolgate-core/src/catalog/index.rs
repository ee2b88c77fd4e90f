//! Similarity index over tool descriptions.
//!
//! A flat embedding table with cosine scoring. Point deletion is not
//! supported; callers rebuild the table without the removed rows.

use std::cmp::Reverse;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use ordered_float::OrderedFloat;

use crate::error::Result;

/// Embedding provider boundary. Production deployments plug a network
/// provider in here; [`HashEmbedder`] keeps the core self-contained.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic character-trigram feature hasher.
///
/// Not a semantic embedding, but stable, dependency-free, and good enough
/// for lexical-overlap ranking of tool descriptions.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(8) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let normalized: Vec<char> = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        let mut vector = vec![0.0f32; self.dims];
        for window in normalized.windows(3) {
            if window.iter().all(|c| *c == ' ') {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            window.hash(&mut hasher);
            let hash = hasher.finish();
            let bucket = (hash % self.dims as u64) as usize;
            // Sign bit spreads collisions across both directions.
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        Ok(vector)
    }
}

struct IndexRow {
    name: String,
    vector: Vec<f32>,
}

/// Flat vector index keyed by tool name.
pub struct SimilarityIndex {
    embedder: Arc<dyn Embedder>,
    rows: Vec<IndexRow>,
}

impl SimilarityIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rows.iter().any(|row| row.name == name)
    }

    /// Index (or re-index) one entry.
    pub async fn upsert(&mut self, name: &str, text: &str) -> Result<()> {
        let vector = self.embedder.embed(text).await?;
        match self.rows.iter_mut().find(|row| row.name == name) {
            Some(row) => row.vector = vector,
            None => self.rows.push(IndexRow {
                name: name.to_string(),
                vector,
            }),
        }
        Ok(())
    }

    /// Rebuild the whole table from `(name, text)` pairs.
    pub async fn rebuild(&mut self, items: &[(String, String)]) -> Result<()> {
        let mut rows = Vec::with_capacity(items.len());
        for (name, text) in items {
            rows.push(IndexRow {
                name: name.clone(),
                vector: self.embedder.embed(text).await?,
            });
        }
        self.rows = rows;
        Ok(())
    }

    /// Top-`limit` names by cosine similarity to the query.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let query_vector = self.embedder.embed(query).await?;
        let query_norm = l2_norm(&query_vector);
        if query_norm == 0.0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(String, f32)> = self
            .rows
            .iter()
            .filter_map(|row| {
                let row_norm = l2_norm(&row.vector);
                if row_norm == 0.0 {
                    return None;
                }
                let dot: f32 = query_vector
                    .iter()
                    .zip(row.vector.iter())
                    .map(|(a, b)| a * b)
                    .sum();
                Some((row.name.clone(), dot / (query_norm * row_norm)))
            })
            .collect();

        scored.sort_by_key(|(_, score)| Reverse(OrderedFloat(*score)));
        scored.truncate(limit);
        Ok(scored)
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
