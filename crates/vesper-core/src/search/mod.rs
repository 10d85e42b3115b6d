//! Search Module
//!
//! Hybrid retrieval: dense vector search fused with sparse/textual search
//! by reciprocal rank fusion, fronted by a short-lived query cache.

mod hybrid;

pub use hybrid::{reciprocal_rank_fusion, HybridSearch, HybridSearchConfig};
