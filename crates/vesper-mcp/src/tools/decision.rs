//! store_decision Tool

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::{validate, Vesper};

use super::{disabled_response, rate_gate, subject_from_args};

/// Input schema for `store_decision`
pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "The decision text"
            },
            "rationale": {
                "type": "string",
                "description": "Why the decision was made"
            },
            "supersedes": {
                "type": "string",
                "description": "UUID of an earlier decision this one replaces (same namespace only)"
            },
            "namespace": { "type": "string" }
        },
        "required": ["content"]
    })
}

/// Execute `store_decision`. Conflicts against live decisions are detected
/// and reported, never raised.
pub async fn execute(vesper: &Arc<Vesper>, args: Option<Value>) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let input = validate::parse_store_decision(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "store_decision").await? {
        return Ok(denied);
    }
    if !vesper.is_active() {
        return Ok(disabled_response());
    }

    let outcome = vesper.store_decision(input).await.map_err(|e| e.to_string())?;
    Ok(json!({
        "success": true,
        "decisionId": outcome.decision_id,
        "conflictsDetected": outcome.conflicts_detected,
    }))
}
