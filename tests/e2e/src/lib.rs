//! End-to-End Test Harness
//!
//! Builds a full engine against a throwaway database with in-process
//! adapters. Scenario tests live in `tests/`.

use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use vesper_core::{validate, Config, Result, ScoredPassage, Vesper};

/// A fully-assembled engine on temporary storage
pub struct TestEngine {
    pub vesper: Arc<Vesper>,
    _dir: TempDir,
}

impl TestEngine {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let config = Config {
            sqlite_db: dir.path().join("e2e.db"),
            home: dir.path().to_path_buf(),
            ..Config::default()
        };
        let vesper = Arc::new(Vesper::new(config).await.expect("engine"));
        Self { vesper, _dir: dir }
    }

    /// Store a memory through the validated path
    pub async fn store(&self, content: &str, memory_type: &str, namespace: &str) -> Result<String> {
        let input = validate::parse_store_memory(json!({
            "content": content,
            "memory_type": memory_type,
            "namespace": namespace,
        }))?;
        Ok(self.vesper.store_memory(input).await?.id)
    }

    /// Retrieve through the validated path
    pub async fn retrieve(&self, query: &str, namespace: &str) -> Result<Vec<ScoredPassage>> {
        let input = validate::parse_retrieve_memory(json!({
            "query": query,
            "namespace": namespace,
            "max_results": 10,
        }))?;
        self.vesper.retrieve_memory(input).await
    }

    /// Raw delete arguments, validated
    pub async fn delete(&self, id: &str, namespace: &str) -> Result<Value> {
        let input = validate::parse_delete_memory(json!({"id": id, "namespace": namespace}))?;
        let outcome = self.vesper.delete_memory(input).await?;
        Ok(serde_json::to_value(&outcome).expect("serialisable"))
    }
}

/// The deterministic scenario vector: `sin(i * 0.01) / 2 + 0.5`
pub fn scenario_vector(dim: usize) -> Vec<f32> {
    (0..dim).map(|i| (i as f32 * 0.01).sin() / 2.0 + 0.5).collect()
}
