//! store_memory Tool

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::{validate, Vesper};

use super::{disabled_response, rate_gate, subject_from_args};

/// Input schema for `store_memory`
pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "The content to remember (1 to 100000 characters)"
            },
            "memory_type": {
                "type": "string",
                "enum": ["episodic", "semantic", "procedural", "decision"],
                "description": "Kind of memory being stored"
            },
            "metadata": {
                "type": "object",
                "description": "Free-form metadata (at most 50 keys, 10 KiB serialised)"
            },
            "namespace": {
                "type": "string",
                "description": "Tenancy boundary; defaults to 'default'"
            },
            "agent_id": { "type": "string" },
            "agent_role": { "type": "string" },
            "task_id": { "type": "string" }
        },
        "required": ["content", "memory_type"]
    })
}

/// Execute `store_memory`
pub async fn execute(vesper: &Arc<Vesper>, args: Option<Value>) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let input = validate::parse_store_memory(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "store_memory").await? {
        return Ok(denied);
    }
    if !vesper.is_active() {
        return Ok(disabled_response());
    }

    let record = vesper.store_memory(input).await.map_err(|e| e.to_string())?;
    Ok(json!({
        "success": true,
        "id": record.id,
        "memoryType": record.memory_type.as_str(),
        "namespace": record.namespace,
        "createdAt": record.created_at.to_rfc3339(),
    }))
}
