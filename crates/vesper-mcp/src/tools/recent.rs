//! list_recent Tool

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::{validate, Vesper};

use super::{rate_gate, subject_from_args};

/// Input schema for `list_recent`
pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "limit": {
                "type": "integer",
                "minimum": 1,
                "maximum": 100,
                "description": "Rows to return, newest first (default 5)"
            },
            "memory_type": {
                "type": "string",
                "enum": ["episodic", "semantic", "procedural", "decision"],
                "description": "Only rows of this type"
            },
            "namespace": { "type": "string" }
        }
    })
}

/// Execute `list_recent`
pub async fn execute(vesper: &Arc<Vesper>, args: Option<Value>) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let input = validate::parse_list_recent(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "list_recent").await? {
        return Ok(denied);
    }
    if !vesper.is_active() {
        return Ok(json!({"success": true, "memories": [], "count": 0}));
    }

    let namespace = input.namespace.clone();
    let records = vesper.list_recent(input).map_err(|e| e.to_string())?;
    let memories: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "content": r.content,
                "memoryType": r.memory_type.as_str(),
                "createdAt": r.created_at.to_rfc3339(),
                "importance": r.importance,
                "accessCount": r.access_count,
            })
        })
        .collect();

    Ok(json!({
        "success": true,
        "namespace": namespace,
        "count": memories.len(),
        "memories": memories,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::test_vesper;

    #[tokio::test]
    async fn test_list_recent_ordering() {
        let (vesper, _dir) = test_vesper().await;
        for i in 0..3 {
            crate::tools::store::execute(
                &vesper,
                Some(json!({"content": format!("memory {i}"), "memory_type": "episodic"})),
            )
            .await
            .unwrap();
        }

        let result = execute(&vesper, Some(json!({"limit": 2}))).await.unwrap();
        assert_eq!(result["count"], 2);
        let memories = result["memories"].as_array().unwrap();
        assert!(memories[0]["createdAt"].as_str() >= memories[1]["createdAt"].as_str());
    }

    #[tokio::test]
    async fn test_list_recent_type_filter() {
        let (vesper, _dir) = test_vesper().await;
        crate::tools::store::execute(
            &vesper,
            Some(json!({"content": "an episode", "memory_type": "episodic"})),
        )
        .await
        .unwrap();
        crate::tools::store::execute(
            &vesper,
            Some(json!({"content": "a decision", "memory_type": "decision"})),
        )
        .await
        .unwrap();

        let result = execute(&vesper, Some(json!({"memory_type": "decision"}))).await.unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["memories"][0]["memoryType"], "decision");
    }

    #[tokio::test]
    async fn test_list_recent_defaults() {
        let (vesper, _dir) = test_vesper().await;
        let result = execute(&vesper, None).await.unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["count"], 0);
    }
}
