//! Embedding Client
//!
//! The embedder is an opaque vectoriser: text in, fixed 1024-float vector
//! out. `HttpEmbedder` talks to the external service named by
//! `EMBEDDING_SERVICE_URL`; `LocalEmbedder` is a deterministic in-process
//! fallback (token hashing, L2-normalised) used in tests and offline.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{Config, EMBEDDING_DIM};
use crate::error::{Result, VesperError};
use crate::vector::validate_vector;

/// Opaque text vectoriser returning `EMBEDDING_DIM` floats
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Vector dimensionality this embedder produces
    fn dim(&self) -> usize {
        EMBEDDING_DIM
    }
}

// ============================================================================
// HTTP EMBEDDER
// ============================================================================

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Client for the external embedding service
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
}

impl HttpEmbedder {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VesperError::Embedding(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VesperError::Timeout(Duration::ZERO, format!("embed: {e}"))
                } else {
                    VesperError::Embedding(format!("embed request: {e}"))
                }
            })?;

        if !response.status().is_success() {
            return Err(VesperError::Embedding(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| VesperError::Embedding(format!("embed response: {e}")))?;

        validate_vector(&body.embedding, EMBEDDING_DIM)?;
        Ok(body.embedding)
    }
}

// ============================================================================
// LOCAL EMBEDDER
// ============================================================================

/// Deterministic in-process vectoriser. Hashes lowercase tokens into a
/// fixed-size bag-of-words vector and L2-normalises, so identical texts map
/// to identical unit vectors and token overlap correlates with cosine
/// similarity. Not a semantic model; good enough for offline operation.
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

/// FNV-1a, stable across platforms and runs
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[async_trait::async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dim as u64) as usize;
            // Signed hashing reduces collisions between unrelated token sets
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        } else {
            // Empty/non-token text still embeds to a valid unit vector
            vector[0] = 1.0;
        }
        Ok(vector)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Build the configured embedder: remote when `EMBEDDING_SERVICE_URL` is
/// set, deterministic local vectoriser otherwise.
pub fn connect(config: &Config) -> Result<Arc<dyn Embedder>> {
    match &config.embedding_service_url {
        Some(url) => Ok(Arc::new(HttpEmbedder::new(url, config.op_timeout)?)),
        None => Ok(Arc::new(LocalEmbedder::default())),
    }
}

// ============================================================================
// TESTS
// ============================================================================
