//! Stats Tools: get_stats, list_namespaces, namespace_stats

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::{validate, Vesper};

use super::{rate_gate, subject_from_args};

/// Input schema for `get_stats`
pub fn stats_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "detailed": {
                "type": "boolean",
                "description": "Include adapter health, vector collection status, and consolidation counters"
            },
            "namespace": { "type": "string" }
        }
    })
}

/// Input schema for `list_namespaces`
pub fn namespaces_schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

/// Input schema for `namespace_stats`
pub fn namespace_stats_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "namespace": {
                "type": "string",
                "description": "Namespace to summarise"
            }
        },
        "required": ["namespace"]
    })
}

/// Execute `get_stats`
pub async fn execute_stats(vesper: &Arc<Vesper>, args: Option<Value>) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let input = validate::parse_get_stats(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "get_stats").await? {
        return Ok(denied);
    }

    let mut stats = vesper.get_stats(input).await.map_err(|e| e.to_string())?;
    stats["success"] = json!(true);
    Ok(stats)
}

/// Execute `list_namespaces`
pub async fn execute_list_namespaces(
    vesper: &Arc<Vesper>,
    args: Option<Value>,
) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    if let Some(denied) = rate_gate(vesper, &subject, "list_namespaces").await? {
        return Ok(denied);
    }

    let namespaces = vesper.list_namespaces().map_err(|e| e.to_string())?;
    Ok(json!({
        "success": true,
        "count": namespaces.len(),
        "namespaces": namespaces,
    }))
}

/// Execute `namespace_stats`
pub async fn execute_namespace_stats(
    vesper: &Arc<Vesper>,
    args: Option<Value>,
) -> Result<Value, String> {
    let subject = subject_from_args(&args);
    let namespace = validate::parse_namespace_stats(args.unwrap_or_else(|| json!({})))
        .map_err(|e| e.to_string())?;

    if let Some(denied) = rate_gate(vesper, &subject, "namespace_stats").await? {
        return Ok(denied);
    }

    let stats = vesper.namespace_stats(&namespace).map_err(|e| e.to_string())?;
    let mut value = serde_json::to_value(&stats).map_err(|e| e.to_string())?;
    value["success"] = json!(true);
    Ok(value)
}
