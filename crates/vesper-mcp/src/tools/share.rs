//! share_context Tool

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::{validate, Vesper};

use super::{disabled_response, rate_gate, subject_from_args};

/// Input schema for `share_context`
pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "source_namespace": {
                "type": "string",
                "description": "Namespace to bundle memories and entities from"
            },
            "target_namespace": {
                "type": "string",
                "description": "Namespace receiving the handoff row"
            },
            "task_id": {
                "type": "string",
                "description": "Only bundle rows attributed to this task"
            },
            "query": {
                "type": "string",
                "description": "Only bundle rows whose content matches this substring"
            },
            "limit": {
                "type": "integer",
                "minimum": 1,
                "description": "Cap on bundled memory rows"
            }
        },
        "required": ["source_namespace", "target_namespace"]
    })
}

/// Execute `share_context`. The only operation that crosses namespaces:
/// source rows are read, a single episodic handoff row lands in the target.
pub async fn execute(vesper: &Arc<Vesper>, args: Option<Value>) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let input = validate::parse_share_context(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "share_context").await? {
        return Ok(denied);
    }
    if !vesper.is_active() {
        return Ok(disabled_response());
    }

    let outcome = vesper.share_context(input).await.map_err(|e| e.to_string())?;
    Ok(json!({
        "success": true,
        "memories": outcome.memories,
        "entities": outcome.entities,
        "handoffId": outcome.handoff_id,
    }))
}
