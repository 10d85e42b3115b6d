//! delete_memory Tool

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::{validate, Vesper};

use super::{disabled_response, rate_gate, subject_from_args};

/// Input schema for `delete_memory`
pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "UUID of the memory row to delete"
            },
            "namespace": {
                "type": "string",
                "description": "Namespace the row lives in; defaults to 'default'"
            }
        },
        "required": ["id"]
    })
}

/// Execute `delete_memory`. Idempotent: deleting a missing row answers
/// `success: false` with "Memory not found".
pub async fn execute(vesper: &Arc<Vesper>, args: Option<Value>) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let input = validate::parse_delete_memory(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "delete_memory").await? {
        return Ok(denied);
    }
    if !vesper.is_active() {
        return Ok(disabled_response());
    }

    let outcome = vesper.delete_memory(input).await.map_err(|e| e.to_string())?;
    serde_json::to_value(&outcome).map_err(|e| e.to_string())
}
