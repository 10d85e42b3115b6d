//! Toggle Tools: vesper_enable, vesper_disable, vesper_status

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::Vesper;

/// Input schema shared by the three toggle tools (no arguments)
pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

/// Execute `vesper_enable`
pub async fn execute_enable(vesper: &Arc<Vesper>) -> Result<Value, String> {
    vesper.set_active(true);
    Ok(json!({"success": true, "active": true}))
}

/// Execute `vesper_disable`. While disabled, writes short-circuit and
/// retrieval answers with empty lists.
pub async fn execute_disable(vesper: &Arc<Vesper>) -> Result<Value, String> {
    vesper.set_active(false);
    Ok(json!({"success": true, "active": false}))
}

/// Execute `vesper_status`
pub async fn execute_status(vesper: &Arc<Vesper>) -> Result<Value, String> {
    Ok(json!({
        "success": true,
        "active": vesper.is_active(),
        "version": vesper_core::VERSION,
    }))
}
