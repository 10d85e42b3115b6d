//! Tool Implementations
//!
//! One module per tool family. Every tool follows the same path: validate
//! arguments into a typed input, pass the rate gate, consult the active
//! flag, then run the engine operation. Business failures come back as
//! `success: false` payloads; only infrastructure trouble surfaces as a
//! tool error.

pub mod decision;
pub mod delete;
pub mod recent;
pub mod retrieve;
pub mod share;
pub mod skills;
pub mod stats;
pub mod store;
pub mod toggle;

use std::sync::Arc;

use serde_json::{json, Value};
use vesper_core::{validate, Vesper, VesperError};

/// Rate-limit subject for a call: a valid `agent_id` argument, else the
/// shared anonymous bucket.
pub(crate) fn subject_from_args(args: &Option<Value>) -> String {
    args.as_ref()
        .and_then(|v| v.get("agent_id"))
        .and_then(Value::as_str)
        .filter(|id| validate::validate_user_id(id).is_ok())
        .unwrap_or("anonymous")
        .to_string()
}

/// Apply the rate gate for `operation`. `Ok(None)` means proceed;
/// `Ok(Some(denial))` is a 429-style business response; `Err` is the
/// fail-closed 503 path (control store unreachable).
pub(crate) async fn rate_gate(
    vesper: &Arc<Vesper>,
    subject: &str,
    operation: &str,
) -> Result<Option<Value>, String> {
    match vesper.check_rate_limit(subject, operation).await {
        Ok(decision) if decision.allowed => Ok(None),
        Ok(decision) => {
            let headers: serde_json::Map<String, Value> = decision
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), json!(value)))
                .collect();
            Ok(Some(json!({
                "success": false,
                "error": "rate_limited",
                "statusCode": 429,
                "operation": operation,
                "headers": headers,
            })))
        }
        Err(VesperError::RateLimited {
            status_code,
            retry_after,
            ..
        }) => Err(format!(
            "rate limiter unavailable (status {status_code}), retry after {}s",
            retry_after.as_secs()
        )),
        Err(e) => Err(e.to_string()),
    }
}

/// Standard short-circuit response for write tools while disabled
pub(crate) fn disabled_response() -> Value {
    json!({
        "success": false,
        "message": "Vesper is disabled. Enable it with vesper_enable.",
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use vesper_core::Config;

    /// Engine against a fresh temp database, fully in-process adapters
    pub(crate) async fn test_vesper() -> (Arc<Vesper>, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            sqlite_db: dir.path().join("test.db"),
            home: dir.path().to_path_buf(),
            ..Config::default()
        };
        (Arc::new(Vesper::new(config).await.unwrap()), dir)
    }
}
