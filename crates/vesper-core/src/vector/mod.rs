//! Vector Index Adapter
//!
//! Talks to a vector database holding one embedding per memory row, keyed by
//! the row's UUID. Writes use wait-for-commit: `upsert` returns only after
//! the point is searchable, which is what makes read-after-write safe inside
//! a single namespace.
//!
//! Two implementations share the trait: `QdrantStore` against a remote
//! service and `MemoryVectorStore` fully in-process for tests and
//! no-`QDRANT_URL` deployments.

mod memory;
mod qdrant;

pub use memory::MemoryVectorStore;
pub use qdrant::QdrantStore;

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Config, MEMORY_COLLECTION};
use crate::error::{Result, VesperError};

static COLLECTION_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]{0,254}$").expect("valid regex"));

/// A search hit from the index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorHit {
    pub id: String,
    /// Cosine similarity in [-1, 1] for dense hits; textual match score for sparse
    pub score: f32,
    pub payload: Value,
}

/// Collection status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub points_count: u64,
    pub status: String,
}

/// Vector index operations. All searches are namespace-filtered; a hit
/// never crosses the namespace it was stored under.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Ensure the collection exists with cosine distance and size `dim`.
    /// Creates and waits for confirmation when absent; no-op when present.
    async fn initialize_collection(&self, dim: usize) -> Result<()>;

    /// Validate and write a vector with its payload. Returns only after the
    /// write is committed and searchable.
    async fn upsert(&self, id: &str, vector: &[f32], payload: Value) -> Result<()>;

    /// Up to `k` nearest points within `namespace`, best first
    async fn dense_search(&self, vector: &[f32], k: usize, namespace: &str) -> Result<Vec<VectorHit>>;

    /// Up to `k` textual matches against payload content within `namespace`
    async fn sparse_search(&self, query: &str, k: usize, namespace: &str) -> Result<Vec<VectorHit>>;

    /// Remove a point by id; absent ids are a no-op
    async fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Point count and collection status
    async fn collection_stats(&self) -> Result<CollectionStats>;
}

/// Validate a collection name against the service's naming rules
pub fn validate_collection_name(name: &str) -> Result<()> {
    if COLLECTION_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(VesperError::Validation(format!(
            "invalid collection name: {name:?}"
        )))
    }
}

/// Validate a vector: exact dimensionality, every component finite
pub fn validate_vector(vector: &[f32], dim: usize) -> Result<()> {
    if vector.len() != dim {
        return Err(VesperError::Validation(format!(
            "vector has {} components, expected {dim}",
            vector.len()
        )));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(VesperError::Validation(format!(
            "vector component {pos} is not finite"
        )));
    }
    Ok(())
}

/// Cosine similarity of two equal-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Build the configured vector store: remote when `QDRANT_URL` is set,
/// in-process otherwise.
pub fn connect(config: &Config, dim: usize) -> Result<Arc<dyn VectorStore>> {
    validate_collection_name(MEMORY_COLLECTION)?;
    match &config.qdrant_url {
        Some(url) => Ok(Arc::new(QdrantStore::new(
            url,
            config.qdrant_api_key.as_deref(),
            MEMORY_COLLECTION,
            dim,
            config.op_timeout,
        )?)),
        None => Ok(Arc::new(MemoryVectorStore::new(dim))),
    }
}

// ============================================================================
// TESTS
// ============================================================================
