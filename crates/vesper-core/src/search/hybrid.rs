//! Hybrid Search (Dense + Sparse + RRF)
//!
//! Fuses dense vector search and sparse/textual search into a single
//! ranking with Reciprocal Rank Fusion. Query results are cached per
//! `(namespace, query, k)` for a short TTL; any write in the namespace
//! invalidates its cache entries.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use serde_json::Value;

use crate::cache::CacheStore;
use crate::config::QUERY_CACHE_TTL;
use crate::embed::Embedder;
use crate::error::{Result, VesperError};
use crate::model::{PassageSource, ScoredPassage};
use crate::vector::{VectorHit, VectorStore};

/// Query-embedding LRU capacity
const EMBEDDING_CACHE_SIZE: usize = 100;

// ============================================================================
// FUSION
// ============================================================================

/// Reciprocal Rank Fusion for combining search results
///
/// For each result present in either list at rank `r` (0-based), add
/// `1 / (r + c)`. The final score is the sum, so results appearing in both
/// lists rank above single-list results, regardless of scoring scale.
pub fn reciprocal_rank_fusion(
    dense_results: &[(String, f32)],
    sparse_results: &[(String, f32)],
    c: f64,
) -> Vec<(String, f64)> {
    let mut scores: HashMap<String, f64> = HashMap::new();

    for (rank, (key, _)) in dense_results.iter().enumerate() {
        *scores.entry(key.clone()).or_default() += 1.0 / (rank as f64 + c);
    }
    for (rank, (key, _)) in sparse_results.iter().enumerate() {
        *scores.entry(key.clone()).or_default() += 1.0 / (rank as f64 + c);
    }

    let mut results: Vec<(String, f64)> = scores.into_iter().collect();
    results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for hybrid search
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    /// RRF constant (higher = more uniform weighting)
    pub rrf_c: f64,
    /// Results fetched from each source before fusion
    pub prefusion_k: usize,
    /// Results returned after fusion when the caller does not say
    pub postfusion_k: usize,
    /// Query cache TTL
    pub cache_ttl: Duration,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            rrf_c: 60.0,
            prefusion_k: 20,
            postfusion_k: 5,
            cache_ttl: QUERY_CACHE_TTL,
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Hybrid search engine over the vector index
pub struct HybridSearch {
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<dyn CacheStore>,
    config: HybridSearchConfig,
    /// LRU for query embeddings, so repeated queries skip the embedder
    embedding_cache: Mutex<LruCache<String, Vec<f32>>>,
}

fn cache_key(namespace: &str, query: &str, k: usize) -> String {
    format!("qcache:{namespace}:{k}:{query}")
}

fn hit_timestamp(payload: &Value) -> DateTime<Utc> {
    payload
        .get("createdAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn hit_content(payload: &Value) -> String {
    payload
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

impl HybridSearch {
    pub fn new(
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self::with_config(vectors, embedder, cache, HybridSearchConfig::default())
    }

    pub fn with_config(
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<dyn CacheStore>,
        config: HybridSearchConfig,
    ) -> Self {
        Self {
            vectors,
            embedder,
            cache,
            config,
            embedding_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(EMBEDDING_CACHE_SIZE).expect("non-zero capacity"),
            )),
        }
    }

    pub fn config(&self) -> &HybridSearchConfig {
        &self.config
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        if let Ok(mut cache) = self.embedding_cache.lock() {
            if let Some(vector) = cache.get(query) {
                return Ok(vector.clone());
            }
        }
        let vector = self.embedder.embed(query).await?;
        if let Ok(mut cache) = self.embedding_cache.lock() {
            cache.put(query.to_string(), vector.clone());
        }
        Ok(vector)
    }

    /// Run a fused dense + sparse search in `namespace`. `k` bounds the
    /// post-fusion result count; `None` uses the configured default.
    pub async fn search(
        &self,
        namespace: &str,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<ScoredPassage>> {
        let k = k.unwrap_or(self.config.postfusion_k);
        let key = cache_key(namespace, query, k);

        if let Some(cached) = self.cache.get(&key).await? {
            if let Ok(passages) = serde_json::from_str::<Vec<ScoredPassage>>(&cached) {
                return Ok(passages);
            }
        }

        let vector = self.query_embedding(query).await?;
        let dense = self
            .vectors
            .dense_search(&vector, self.config.prefusion_k, namespace)
            .await?;
        let sparse = self
            .vectors
            .sparse_search(query, self.config.prefusion_k, namespace)
            .await?;

        let passages = self.fuse(&dense, &sparse, k);

        let payload = serde_json::to_string(&passages)
            .map_err(|e| VesperError::Internal(format!("passage serialise: {e}")))?;
        self.cache.set_with_ttl(&key, &payload, self.config.cache_ttl).await?;

        Ok(passages)
    }

    /// Fuse two hit lists into ranked passages. Deduplicates by id and
    /// normalises similarity into (0, 1], descending with rank.
    fn fuse(&self, dense: &[VectorHit], sparse: &[VectorHit], k: usize) -> Vec<ScoredPassage> {
        let dense_pairs: Vec<(String, f32)> =
            dense.iter().map(|h| (h.id.clone(), h.score)).collect();
        let sparse_pairs: Vec<(String, f32)> =
            sparse.iter().map(|h| (h.id.clone(), h.score)).collect();

        let fused = reciprocal_rank_fusion(&dense_pairs, &sparse_pairs, self.config.rrf_c);
        let top_score = fused.first().map(|(_, s)| *s).unwrap_or(1.0).max(f64::MIN_POSITIVE);

        let mut payloads: HashMap<&str, &Value> = HashMap::new();
        for hit in dense.iter().chain(sparse.iter()) {
            payloads.entry(hit.id.as_str()).or_insert(&hit.payload);
        }

        fused
            .into_iter()
            .take(k)
            .filter_map(|(id, score)| {
                let payload = payloads.get(id.as_str())?;
                Some(ScoredPassage {
                    content: hit_content(payload),
                    similarity: score / top_score,
                    source: PassageSource::Hybrid,
                    timestamp: hit_timestamp(payload),
                    id,
                })
            })
            .collect()
    }

    /// Drop every cached query result for the namespace. Called after any
    /// write in that namespace.
    pub async fn invalidate_namespace(&self, namespace: &str) -> Result<()> {
        let keys = self.cache.keys(&format!("qcache:{namespace}:*")).await?;
        for key in keys {
            self.cache.delete(&key).await?;
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
