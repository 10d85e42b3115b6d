//! retrieve_memory Tool

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::{validate, Vesper};

use super::{rate_gate, subject_from_args};

/// Input schema for `retrieve_memory`
pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What to recall (1 to 10000 characters)"
            },
            "memory_types": {
                "type": "array",
                "items": {
                    "type": "string",
                    "enum": ["episodic", "semantic", "procedural", "decision"]
                },
                "description": "Restrict results to these memory types"
            },
            "max_results": {
                "type": "integer",
                "minimum": 1,
                "maximum": 100,
                "description": "Result cap (default 5)"
            },
            "routing_strategy": {
                "type": "string",
                "description": "Advisory routing hint; the classifier decides by default"
            },
            "namespace": { "type": "string" }
        },
        "required": ["query"]
    })
}

/// Execute `retrieve_memory`
pub async fn execute(vesper: &Arc<Vesper>, args: Option<Value>) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let input = validate::parse_retrieve_memory(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "retrieve_memory").await? {
        return Ok(denied);
    }
    // Disabled: retrieval answers with an empty list, not an error
    if !vesper.is_active() {
        return Ok(json!({"success": true, "results": [], "count": 0}));
    }

    let namespace = input.namespace.clone();
    let passages = vesper.retrieve_memory(input).await.map_err(|e| e.to_string())?;
    let results: Vec<Value> = passages
        .iter()
        .map(|p| {
            json!({
                "id": p.id,
                "content": p.content,
                "similarity": p.similarity,
                "source": p.source.as_str(),
                "timestamp": p.timestamp.to_rfc3339(),
            })
        })
        .collect();

    Ok(json!({
        "success": true,
        "namespace": namespace,
        "count": results.len(),
        "results": results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::test_vesper;

    #[tokio::test]
    async fn test_retrieve_returns_provenance() {
        let (vesper, _dir) = test_vesper().await;
        crate::tools::store::execute(
            &vesper,
            Some(json!({
                "content": "The staging cluster runs kubernetes",
                "memory_type": "semantic",
            })),
        )
        .await
        .unwrap();

        let result = execute(
            &vesper,
            Some(json!({"query": "staging cluster kubernetes runtime"})),
        )
        .await
        .unwrap();

        assert_eq!(result["success"], true);
        let results = result["results"].as_array().unwrap();
        assert!(!results.is_empty());
        assert!(results[0]["similarity"].as_f64().unwrap() > 0.0);
        assert!(results[0]["source"].is_string());
    }

    #[tokio::test]
    async fn test_retrieve_disabled_returns_empty() {
        let (vesper, _dir) = test_vesper().await;
        vesper.set_active(false);
        let result = execute(&vesper, Some(json!({"query": "anything"}))).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["count"], 0);
    }

    #[tokio::test]
    async fn test_retrieve_validates_query() {
        let (vesper, _dir) = test_vesper().await;
        assert!(execute(&vesper, Some(json!({"query": ""}))).await.is_err());
        assert!(execute(&vesper, Some(json!({"query": "x", "max_results": 0})))
            .await
            .is_err());
    }

    #[test]
    fn test_schema_structure() {
        let schema = schema();
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["max_results"]["maximum"], 100);
    }
}
