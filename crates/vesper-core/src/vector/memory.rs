//! In-Process Vector Index
//!
//! Exact cosine search over an in-memory point set. Slow past a few tens of
//! thousands of points but semantically identical to the remote index,
//! including wait-for-commit (trivially: the write is searchable when the
//! mutex is released).

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use super::{cosine_similarity, validate_vector, CollectionStats, VectorHit, VectorStore};
use crate::error::{Result, VesperError};

struct Point {
    vector: Vec<f32>,
    payload: Value,
}

/// In-process vector store
pub struct MemoryVectorStore {
    dim: usize,
    points: Mutex<HashMap<String, Point>>,
}

impl MemoryVectorStore {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            points: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Point>>> {
        self.points
            .lock()
            .map_err(|_| VesperError::Vector("point set lock poisoned".into()))
    }
}

fn payload_namespace(payload: &Value) -> &str {
    payload.get("namespace").and_then(Value::as_str).unwrap_or("")
}

fn payload_text(payload: &Value) -> String {
    let mut text = String::new();
    for field in ["content", "memoryType", "agentId", "taskId"] {
        if let Some(v) = payload.get(field).and_then(Value::as_str) {
            text.push_str(v);
            text.push(' ');
        }
    }
    text
}

/// Fraction of query tokens present in the candidate text
fn keyword_score(query: &str, text: &str) -> f32 {
    let haystack = text.to_lowercase();
    let tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f32 / tokens.len() as f32
}

#[async_trait::async_trait]
impl VectorStore for MemoryVectorStore {
    async fn initialize_collection(&self, dim: usize) -> Result<()> {
        if dim != self.dim {
            return Err(VesperError::Vector(format!(
                "collection exists with size {}, requested {dim}",
                self.dim
            )));
        }
        Ok(())
    }

    async fn upsert(&self, id: &str, vector: &[f32], payload: Value) -> Result<()> {
        validate_vector(vector, self.dim)?;
        self.lock()?.insert(
            id.to_string(),
            Point {
                vector: vector.to_vec(),
                payload,
            },
        );
        Ok(())
    }

    async fn dense_search(&self, vector: &[f32], k: usize, namespace: &str) -> Result<Vec<VectorHit>> {
        validate_vector(vector, self.dim)?;
        let points = self.lock()?;
        let mut hits: Vec<VectorHit> = points
            .iter()
            .filter(|(_, p)| payload_namespace(&p.payload) == namespace)
            .map(|(id, p)| VectorHit {
                id: id.clone(),
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn sparse_search(&self, query: &str, k: usize, namespace: &str) -> Result<Vec<VectorHit>> {
        let points = self.lock()?;
        let mut hits: Vec<VectorHit> = points
            .iter()
            .filter(|(_, p)| payload_namespace(&p.payload) == namespace)
            .filter_map(|(id, p)| {
                let score = keyword_score(query, &payload_text(&p.payload));
                (score > 0.0).then(|| VectorHit {
                    id: id.clone(),
                    score,
                    payload: p.payload.clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.lock()?.remove(id);
        Ok(())
    }

    async fn collection_stats(&self) -> Result<CollectionStats> {
        let count = self.lock()?.len() as u64;
        Ok(CollectionStats {
            points_count: count,
            status: "green".to_string(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit_vector(dim: usize, phase: f32) -> Vec<f32> {
        (0..dim).map(|i| ((i as f32) * 0.01 + phase).sin() / 2.0 + 0.5).collect()
    }

    #[tokio::test]
    async fn test_upsert_then_immediate_search() {
        let store = MemoryVectorStore::new(16);
        let v = unit_vector(16, 0.0);
        store
            .upsert("u1", &v, json!({"content": "hi", "namespace": "default"}))
            .await
            .unwrap();

        let hits = store.dense_search(&v, 5, "default").await.unwrap();
        assert_eq!(hits[0].id, "u1");
        assert!(hits[0].score >= 0.99);
        assert_eq!(hits[0].payload["content"], "hi");
    }

    #[tokio::test]
    async fn test_dense_search_is_namespace_scoped() {
        let store = MemoryVectorStore::new(8);
        let v = unit_vector(8, 0.0);
        store.upsert("a1", &v, json!({"namespace": "a"})).await.unwrap();
        store.upsert("b1", &v, json!({"namespace": "b"})).await.unwrap();

        let hits = store.dense_search(&v, 10, "a").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a1");
    }

    #[tokio::test]
    async fn test_invalid_vector_rejected() {
        let store = MemoryVectorStore::new(4);
        let err = store
            .upsert("x", &[1.0, f32::NAN, 0.0, 0.0], json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, VesperError::Validation(_)));

        let err = store.upsert("x", &[1.0, 2.0], json!({})).await.unwrap_err();
        assert!(matches!(err, VesperError::Validation(_)));
    }

    #[tokio::test]
    async fn test_sparse_search_keyword_match() {
        let store = MemoryVectorStore::new(4);
        store
            .upsert(
                "m1",
                &[1.0, 0.0, 0.0, 0.0],
                json!({"content": "rust ownership and borrowing", "namespace": "default"}),
            )
            .await
            .unwrap();
        store
            .upsert(
                "m2",
                &[0.0, 1.0, 0.0, 0.0],
                json!({"content": "gardening tips", "namespace": "default"}),
            )
            .await
            .unwrap();

        let hits = store.sparse_search("rust borrowing", 5, "default").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1");
        assert!(hits[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_delete_then_search_misses() {
        let store = MemoryVectorStore::new(4);
        let v = [1.0, 0.0, 0.0, 0.0];
        store.upsert("gone", &v, json!({"namespace": "default"})).await.unwrap();
        store.delete_by_id("gone").await.unwrap();
        let hits = store.dense_search(&v, 5, "default").await.unwrap();
        assert!(hits.is_empty());

        // Deleting again is a no-op
        store.delete_by_id("gone").await.unwrap();
    }

    #[tokio::test]
    async fn test_stats() {
        let store = MemoryVectorStore::new(4);
        store.initialize_collection(4).await.unwrap();
        assert_eq!(store.collection_stats().await.unwrap().points_count, 0);
        store
            .upsert("p", &[0.5, 0.5, 0.5, 0.5], json!({"namespace": "default"}))
            .await
            .unwrap();
        let stats = store.collection_stats().await.unwrap();
        assert_eq!(stats.points_count, 1);
        assert_eq!(stats.status, "green");
    }
}
