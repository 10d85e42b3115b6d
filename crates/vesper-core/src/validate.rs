//! Validation Layer
//!
//! Tool inputs are compile-time structs; this module is the validation pass
//! that turns raw JSON arguments into typed values. Bounds live next to the
//! parsers, string fields are stripped of NUL bytes and trimmed, and
//! violations surface as `Validation` errors before any tier is touched.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Result, VesperError};
use crate::model::{MemoryType, DEFAULT_NAMESPACE};

/// Content bound for `store_memory`
pub const MAX_CONTENT_CHARS: usize = 100_000;
/// Query bound for `retrieve_memory`
pub const MAX_QUERY_CHARS: usize = 10_000;
/// Metadata bounds
pub const MAX_METADATA_KEYS: usize = 50;
pub const MAX_METADATA_BYTES: usize = 10 * 1024;
/// Result-count bounds
pub const MAX_RESULTS: usize = 100;
pub const DEFAULT_RESULTS: usize = 5;

static USER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

// ============================================================================
// SANITISATION
// ============================================================================

/// Strip NUL bytes and trim surrounding whitespace
pub fn sanitize(value: &str) -> String {
    value.replace('\0', "").trim().to_string()
}

fn sanitize_opt(value: Option<String>) -> Option<String> {
    value.map(|v| sanitize(&v)).filter(|v| !v.is_empty())
}

/// Validate a user/agent identifier
pub fn validate_user_id(id: &str) -> Result<()> {
    if USER_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(VesperError::Validation(format!("invalid user id: {id:?}")))
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value, tool: &str) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| VesperError::Validation(format!("{tool}: {e}")))
}

/// A missing namespace means `"default"`; an explicit empty string is a
/// namespace of its own and passes through untouched.
fn resolve_namespace(namespace: Option<String>) -> String {
    match namespace {
        Some(ns) => ns.replace('\0', ""),
        None => DEFAULT_NAMESPACE.to_string(),
    }
}

fn validate_metadata(metadata: &Map<String, Value>) -> Result<()> {
    if metadata.len() > MAX_METADATA_KEYS {
        return Err(VesperError::Validation(format!(
            "metadata has {} keys, limit is {MAX_METADATA_KEYS}",
            metadata.len()
        )));
    }
    let serialised = serde_json::to_string(metadata)
        .map_err(|e| VesperError::Validation(format!("metadata not serialisable: {e}")))?;
    if serialised.len() > MAX_METADATA_BYTES {
        return Err(VesperError::Validation(format!(
            "metadata serialises to {} bytes, limit is {MAX_METADATA_BYTES}",
            serialised.len()
        )));
    }
    Ok(())
}

// ============================================================================
// STORE MEMORY
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct StoreMemoryArgs {
    content: String,
    memory_type: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    agent_role: Option<String>,
    #[serde(default)]
    task_id: Option<String>,
}

/// Validated `store_memory` input
#[derive(Debug, Clone)]
pub struct StoreMemoryInput {
    pub content: String,
    pub memory_type: MemoryType,
    pub metadata: Map<String, Value>,
    pub namespace: String,
    pub agent_id: Option<String>,
    pub agent_role: Option<String>,
    pub task_id: Option<String>,
}

pub fn parse_store_memory(args: Value) -> Result<StoreMemoryInput> {
    let args: StoreMemoryArgs = parse_args(args, "store_memory")?;

    let content = sanitize(&args.content);
    if content.is_empty() {
        return Err(VesperError::Validation("content must not be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(VesperError::Validation(format!(
            "content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }

    let memory_type = MemoryType::parse_name(args.memory_type.trim()).ok_or_else(|| {
        VesperError::Validation(format!(
            "memory_type must be one of episodic, semantic, procedural, decision (got {:?})",
            args.memory_type
        ))
    })?;

    let metadata = args.metadata.unwrap_or_default();
    validate_metadata(&metadata)?;

    let agent_id = sanitize_opt(args.agent_id);
    if let Some(agent_id) = &agent_id {
        validate_user_id(agent_id)?;
    }

    Ok(StoreMemoryInput {
        content,
        memory_type,
        metadata,
        namespace: resolve_namespace(args.namespace),
        agent_id,
        agent_role: sanitize_opt(args.agent_role),
        task_id: sanitize_opt(args.task_id),
    })
}

// ============================================================================
// RETRIEVE MEMORY
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct RetrieveMemoryArgs {
    query: String,
    #[serde(default)]
    memory_types: Option<Vec<String>>,
    #[serde(default)]
    max_results: Option<i64>,
    #[serde(default)]
    routing_strategy: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

/// Validated `retrieve_memory` input
#[derive(Debug, Clone)]
pub struct RetrieveMemoryInput {
    pub query: String,
    pub memory_types: Option<Vec<MemoryType>>,
    pub max_results: usize,
    pub routing_strategy: Option<String>,
    pub namespace: String,
}

pub fn parse_retrieve_memory(args: Value) -> Result<RetrieveMemoryInput> {
    let args: RetrieveMemoryArgs = parse_args(args, "retrieve_memory")?;

    let query = sanitize(&args.query);
    if query.is_empty() {
        return Err(VesperError::Validation("query must not be empty".into()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(VesperError::Validation(format!(
            "query exceeds {MAX_QUERY_CHARS} characters"
        )));
    }

    let max_results = match args.max_results {
        None => DEFAULT_RESULTS,
        Some(n) if (1..=MAX_RESULTS as i64).contains(&n) => n as usize,
        Some(n) => {
            return Err(VesperError::Validation(format!(
                "max_results must be in 1..={MAX_RESULTS} (got {n})"
            )))
        }
    };

    let memory_types = args
        .memory_types
        .map(|types| {
            types
                .iter()
                .map(|t| {
                    MemoryType::parse_name(t.trim()).ok_or_else(|| {
                        VesperError::Validation(format!("unknown memory type {t:?}"))
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    Ok(RetrieveMemoryInput {
        query,
        memory_types,
        max_results,
        routing_strategy: sanitize_opt(args.routing_strategy),
        namespace: resolve_namespace(args.namespace),
    })
}

// ============================================================================
// LIST RECENT
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct ListRecentArgs {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    memory_type: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

/// Validated `list_recent` input
#[derive(Debug, Clone)]
pub struct ListRecentInput {
    pub limit: usize,
    pub memory_type: Option<MemoryType>,
    pub namespace: String,
}

pub fn parse_list_recent(args: Value) -> Result<ListRecentInput> {
    let args: ListRecentArgs = parse_args(args, "list_recent")?;

    let limit = match args.limit {
        None => DEFAULT_RESULTS,
        Some(n) if (1..=MAX_RESULTS as i64).contains(&n) => n as usize,
        Some(n) => {
            return Err(VesperError::Validation(format!(
                "limit must be in 1..={MAX_RESULTS} (got {n})"
            )))
        }
    };

    let memory_type = args
        .memory_type
        .map(|t| {
            MemoryType::parse_name(t.trim())
                .ok_or_else(|| VesperError::Validation(format!("unknown memory type {t:?}")))
        })
        .transpose()?;

    Ok(ListRecentInput {
        limit,
        memory_type,
        namespace: resolve_namespace(args.namespace),
    })
}

// ============================================================================
// GET STATS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct GetStatsArgs {
    #[serde(default)]
    detailed: Option<bool>,
    #[serde(default)]
    namespace: Option<String>,
}

/// Validated `get_stats` input
#[derive(Debug, Clone)]
pub struct GetStatsInput {
    pub detailed: bool,
    pub namespace: String,
}

pub fn parse_get_stats(args: Value) -> Result<GetStatsInput> {
    let args: GetStatsArgs = parse_args(args, "get_stats")?;
    Ok(GetStatsInput {
        detailed: args.detailed.unwrap_or(false),
        namespace: resolve_namespace(args.namespace),
    })
}

// ============================================================================
// SKILL OUTCOME
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct RecordSkillOutcomeArgs {
    skill_id: String,
    outcome: String,
    #[serde(default)]
    satisfaction: Option<f64>,
}

/// Validated `record_skill_outcome` input
#[derive(Debug, Clone)]
pub struct RecordSkillOutcomeInput {
    pub skill_id: String,
    pub success: bool,
    /// Present exactly when `success` is true
    pub satisfaction: Option<f64>,
}

pub fn parse_record_skill_outcome(args: Value) -> Result<RecordSkillOutcomeInput> {
    let args: RecordSkillOutcomeArgs = parse_args(args, "record_skill_outcome")?;

    let skill_id = sanitize(&args.skill_id);
    if skill_id.is_empty() {
        return Err(VesperError::Validation("skill_id must not be empty".into()));
    }

    let success = match args.outcome.trim() {
        "success" => true,
        "failure" => false,
        other => {
            return Err(VesperError::Validation(format!(
                "outcome must be 'success' or 'failure' (got {other:?})"
            )))
        }
    };

    // Satisfaction is required with success, rejected with failure
    let satisfaction = match (success, args.satisfaction) {
        (true, Some(s)) if (0.0..=1.0).contains(&s) => Some(s),
        (true, Some(s)) => {
            return Err(VesperError::Validation(format!(
                "satisfaction must be in [0, 1] (got {s})"
            )))
        }
        (true, None) => {
            return Err(VesperError::Validation(
                "satisfaction is required when outcome is 'success'".into(),
            ))
        }
        (false, Some(_)) => {
            return Err(VesperError::Validation(
                "satisfaction is only valid when outcome is 'success'".into(),
            ))
        }
        (false, None) => None,
    };

    Ok(RecordSkillOutcomeInput {
        skill_id,
        success,
        satisfaction,
    })
}

// ============================================================================
// DELETE MEMORY
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct DeleteMemoryArgs {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

/// Validated `delete_memory` input. An empty id is preserved so the tool
/// can answer `success: false` rather than raising.
#[derive(Debug, Clone)]
pub struct DeleteMemoryInput {
    pub id: String,
    pub namespace: String,
}

pub fn parse_delete_memory(args: Value) -> Result<DeleteMemoryInput> {
    let args: DeleteMemoryArgs = parse_args(args, "delete_memory")?;
    Ok(DeleteMemoryInput {
        id: sanitize(&args.id.unwrap_or_default()),
        namespace: resolve_namespace(args.namespace),
    })
}

// ============================================================================
// SHARE CONTEXT
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct ShareContextArgs {
    source_namespace: String,
    target_namespace: String,
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

/// Validated `share_context` input
#[derive(Debug, Clone)]
pub struct ShareContextInput {
    pub source_namespace: String,
    pub target_namespace: String,
    pub task_id: Option<String>,
    pub query: Option<String>,
    pub limit: Option<usize>,
}

pub fn parse_share_context(args: Value) -> Result<ShareContextInput> {
    let args: ShareContextArgs = parse_args(args, "share_context")?;

    let limit = match args.limit {
        None => None,
        Some(n) if n >= 1 => Some(n as usize),
        Some(n) => {
            return Err(VesperError::Validation(format!(
                "limit must be positive (got {n})"
            )))
        }
    };

    Ok(ShareContextInput {
        source_namespace: args.source_namespace.replace('\0', ""),
        target_namespace: args.target_namespace.replace('\0', ""),
        task_id: sanitize_opt(args.task_id),
        query: sanitize_opt(args.query),
        limit,
    })
}

// ============================================================================
// STORE DECISION
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct StoreDecisionArgs {
    content: String,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    supersedes: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

/// Validated `store_decision` input
#[derive(Debug, Clone)]
pub struct StoreDecisionInput {
    pub content: String,
    pub rationale: Option<String>,
    pub supersedes: Option<String>,
    pub namespace: String,
}

pub fn parse_store_decision(args: Value) -> Result<StoreDecisionInput> {
    let args: StoreDecisionArgs = parse_args(args, "store_decision")?;

    let content = sanitize(&args.content);
    if content.is_empty() {
        return Err(VesperError::Validation("content must not be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(VesperError::Validation(format!(
            "content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }

    Ok(StoreDecisionInput {
        content,
        rationale: sanitize_opt(args.rationale),
        supersedes: sanitize_opt(args.supersedes),
        namespace: resolve_namespace(args.namespace),
    })
}

// ============================================================================
// LOAD SKILL / NAMESPACE STATS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct LoadSkillArgs {
    skill_id: String,
    #[serde(default)]
    namespace: Option<String>,
}

/// Validated `load_skill` input
#[derive(Debug, Clone)]
pub struct LoadSkillInput {
    pub skill_id: String,
    pub namespace: String,
}

pub fn parse_load_skill(args: Value) -> Result<LoadSkillInput> {
    let args: LoadSkillArgs = parse_args(args, "load_skill")?;
    let skill_id = sanitize(&args.skill_id);
    if skill_id.is_empty() {
        return Err(VesperError::Validation("skill_id must not be empty".into()));
    }
    Ok(LoadSkillInput {
        skill_id,
        namespace: resolve_namespace(args.namespace),
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct NamespaceStatsArgs {
    namespace: String,
}

pub fn parse_namespace_stats(args: Value) -> Result<String> {
    let args: NamespaceStatsArgs = parse_args(args, "namespace_stats")?;
    Ok(args.namespace.replace('\0', ""))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_memory_happy_path() {
        let input = parse_store_memory(json!({
            "content": "  User prefers dark roast\0  ",
            "memory_type": "semantic",
            "metadata": {"topic": "coffee"},
            "agent_id": "agent-1",
        }))
        .unwrap();
        assert_eq!(input.content, "User prefers dark roast");
        assert_eq!(input.memory_type, MemoryType::Semantic);
        assert_eq!(input.namespace, "default");
        assert_eq!(input.agent_id.as_deref(), Some("agent-1"));
    }

    #[test]
    fn test_store_memory_rejects_bad_type_and_empty_content() {
        assert!(parse_store_memory(json!({"content": "x", "memory_type": "dream"})).is_err());
        assert!(parse_store_memory(json!({"content": "   ", "memory_type": "episodic"})).is_err());
        assert!(parse_store_memory(json!({"content": "x".repeat(100_001), "memory_type": "episodic"})).is_err());
    }

    #[test]
    fn test_store_memory_rejects_unknown_fields() {
        let result = parse_store_memory(json!({
            "content": "x",
            "memory_type": "episodic",
            "injected": true,
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_store_memory_metadata_bounds() {
        let mut metadata = Map::new();
        for i in 0..51 {
            metadata.insert(format!("k{i}"), json!(i));
        }
        let result = parse_store_memory(json!({
            "content": "x",
            "memory_type": "episodic",
            "metadata": metadata,
        }));
        assert!(result.is_err());

        let result = parse_store_memory(json!({
            "content": "x",
            "memory_type": "episodic",
            "metadata": {"blob": "y".repeat(11 * 1024)},
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_store_memory_invalid_agent_id() {
        let result = parse_store_memory(json!({
            "content": "x",
            "memory_type": "episodic",
            "agent_id": "not a valid id!",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_namespace_is_preserved() {
        let input = parse_store_memory(json!({
            "content": "x",
            "memory_type": "episodic",
            "namespace": "",
        }))
        .unwrap();
        assert_eq!(input.namespace, "");

        let input = parse_store_memory(json!({
            "content": "x",
            "memory_type": "episodic",
        }))
        .unwrap();
        assert_eq!(input.namespace, "default");
    }

    #[test]
    fn test_retrieve_memory_defaults_and_bounds() {
        let input = parse_retrieve_memory(json!({"query": "coffee"})).unwrap();
        assert_eq!(input.max_results, 5);

        assert!(parse_retrieve_memory(json!({"query": "x", "max_results": 0})).is_err());
        assert!(parse_retrieve_memory(json!({"query": "x", "max_results": 101})).is_err());
        assert!(parse_retrieve_memory(json!({"query": ""})).is_err());
        assert!(parse_retrieve_memory(json!({"query": "q".repeat(10_001)})).is_err());
    }

    #[test]
    fn test_list_recent_bounds() {
        let input = parse_list_recent(json!({})).unwrap();
        assert_eq!(input.limit, 5);
        assert!(input.memory_type.is_none());

        let input = parse_list_recent(json!({"limit": 10, "memory_type": "decision"})).unwrap();
        assert_eq!(input.limit, 10);
        assert_eq!(input.memory_type, Some(MemoryType::Decision));

        assert!(parse_list_recent(json!({"limit": 0})).is_err());
    }

    #[test]
    fn test_skill_outcome_satisfaction_rules() {
        let input = parse_record_skill_outcome(json!({
            "skill_id": "s1",
            "outcome": "success",
            "satisfaction": 0.8,
        }))
        .unwrap();
        assert!(input.success);
        assert_eq!(input.satisfaction, Some(0.8));

        // Required iff success
        assert!(parse_record_skill_outcome(json!({"skill_id": "s1", "outcome": "success"})).is_err());
        assert!(parse_record_skill_outcome(
            json!({"skill_id": "s1", "outcome": "failure", "satisfaction": 0.8})
        )
        .is_err());
        assert!(parse_record_skill_outcome(
            json!({"skill_id": "s1", "outcome": "success", "satisfaction": 1.5})
        )
        .is_err());
        assert!(parse_record_skill_outcome(json!({"skill_id": "", "outcome": "failure"})).is_err());

        let input =
            parse_record_skill_outcome(json!({"skill_id": "s1", "outcome": "failure"})).unwrap();
        assert!(!input.success);
    }

    #[test]
    fn test_delete_memory_preserves_empty_id() {
        let input = parse_delete_memory(json!({})).unwrap();
        assert!(input.id.is_empty());
        assert_eq!(input.namespace, "default");
    }

    #[test]
    fn test_share_context() {
        let input = parse_share_context(json!({
            "source_namespace": "a",
            "target_namespace": "b",
            "limit": 3,
        }))
        .unwrap();
        assert_eq!(input.source_namespace, "a");
        assert_eq!(input.target_namespace, "b");
        assert_eq!(input.limit, Some(3));

        assert!(parse_share_context(json!({
            "source_namespace": "a",
            "target_namespace": "b",
            "limit": -1,
        }))
        .is_err());
    }

    #[test]
    fn test_user_id_charset() {
        assert!(validate_user_id("agent-1_A").is_ok());
        assert!(validate_user_id("bad id").is_err());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("semi;colon").is_err());
    }
}
