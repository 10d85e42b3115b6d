//! Data Model
//!
//! Shared record types for the three tiers and the tool surface. Every
//! persisted record carries exactly one namespace; reads and mutations are
//! always scoped by it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Namespace used when a tool call omits one. The empty string is a legal
/// namespace of its own, distinct from this.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Decay factor stamped into decision metadata so decisions outlive the
/// standard temporal decay applied to ordinary memories.
pub const DECISION_DECAY_FACTOR: f64 = 0.25;

// ============================================================================
// MEMORY RECORDS
// ============================================================================

/// Types of durable memory rows
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// A conversation episode or handoff bundle
    #[default]
    Episodic,
    /// Distilled knowledge
    Semantic,
    /// How-to knowledge, usually paired with a skill row
    Procedural,
    /// A recorded decision with rationale and supersede chain
    Decision,
}

impl MemoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Decision => "decision",
        }
    }

    /// Parse from a stored string; unknown values are rejected
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "episodic" => Some(MemoryType::Episodic),
            "semantic" => Some(MemoryType::Semantic),
            "procedural" => Some(MemoryType::Procedural),
            "decision" => Some(MemoryType::Decision),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable memory row, produced by `store_memory`, `store_decision`, and
/// `share_context` handoffs. The sibling embedding vector lives in the
/// vector index under the same UUID.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Raw content (at most 100 000 characters)
    pub content: String,
    /// Memory type
    pub memory_type: MemoryType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Importance in [0, 1]
    pub importance: f64,
    /// Monotone access counter
    pub access_count: i64,
    pub last_accessed: DateTime<Utc>,
    /// Free-form metadata object (at most 50 keys, 10 KiB serialised)
    pub metadata: Map<String, Value>,
    /// Tenancy boundary
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl MemoryRecord {
    /// Build a fresh row with a new UUID and current timestamps
    pub fn new(content: impl Into<String>, memory_type: MemoryType, namespace: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            memory_type,
            created_at: now,
            updated_at: now,
            importance: 0.5,
            access_count: 0,
            last_accessed: now,
            metadata: Map::new(),
            namespace: namespace.into(),
            agent_id: None,
            agent_role: None,
            task_id: None,
        }
    }

    /// A decision that has been superseded by a newer one
    pub fn is_superseded(&self) -> bool {
        self.metadata.contains_key("superseded_by")
    }
}

// ============================================================================
// SEMANTIC GRAPH
// ============================================================================

/// An entity node in the semantic graph. Unique on `(name, namespace)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    /// Open vocabulary: person, project, concept, preference, ...
    pub entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Monotone, at least 1
    pub access_count: i64,
    pub namespace: String,
}

/// Input for `upsert_entity`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityInput {
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A directed edge in the semantic graph.
/// Unique on `(source_id, target_id, relation_type, namespace)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    /// Strength in [0, 1]; reinforcement moves it toward 1, never past it
    pub strength: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_reinforced: DateTime<Utc>,
    pub namespace: String,
}

/// Input for `upsert_relationship`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RelationshipInput {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub evidence: Option<String>,
}

/// A property assertion about an entity. An open interval
/// (`valid_until = None`) means "currently believed true".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub id: String,
    pub entity_id: String,
    pub property: String,
    pub value: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Memory row this fact was extracted from, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_conversation: Option<String>,
    pub namespace: String,
}

impl Fact {
    /// Currently believed true (open-ended validity)
    pub fn is_open(&self) -> bool {
        self.valid_until.is_none()
    }

    /// Validity intervals overlap, treating a missing end as open-ended
    pub fn overlaps(&self, other: &Fact) -> bool {
        let a_start = self.valid_from.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let b_start = other.valid_from.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let a_end = self.valid_until.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let b_end = other.valid_until.unwrap_or(DateTime::<Utc>::MAX_UTC);
        a_start <= b_end && b_start <= a_end
    }
}

// ============================================================================
// SKILLS
// ============================================================================

/// How a skill's code payload is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeType {
    /// Code body stored in the row
    Inline,
    /// Pointer to an external artifact
    Reference,
}

/// A procedural skill row. The `summary` satisfies catalog queries; the
/// full row (with `code` and `description`) is loaded only on invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: String,
    pub name: String,
    /// Long body
    pub description: String,
    /// Short blurb shown in catalogs
    pub summary: String,
    pub category: String,
    /// Ordered trigger phrases
    pub triggers: Vec<String>,
    pub success_count: i64,
    pub failure_count: i64,
    /// Cumulative mean satisfaction in [0, 1], default 0.5
    pub avg_user_satisfaction: f64,
    pub is_archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_type: Option<CodeType>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub uses_skills: Vec<String>,
    pub version: i64,
    pub namespace: String,
}

impl Skill {
    /// success_count / (success_count + failure_count), or the satisfaction
    /// mean when there is no outcome history yet
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total > 0 {
            self.success_count as f64 / total as f64
        } else {
            self.avg_user_satisfaction
        }
    }

    /// Catalog ranking score
    pub fn quality_score(&self) -> f64 {
        self.avg_user_satisfaction * self.success_rate()
    }

    /// Summary projection for catalog responses
    pub fn summary_view(&self) -> SkillSummary {
        SkillSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            summary: self.summary.clone(),
            category: self.category.clone(),
            triggers: self.triggers.clone(),
            quality_score: self.quality_score(),
        }
    }
}

/// Two-phase loading: summaries alone satisfy catalog queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSummary {
    pub id: String,
    pub name: String,
    pub summary: String,
    pub category: String,
    pub triggers: Vec<String>,
    pub quality_score: f64,
}

/// Input for `add_skill`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SkillSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub code_type: Option<CodeType>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub uses_skills: Vec<String>,
}

/// Result of skill invocation detection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationMatch {
    pub is_invocation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
    pub confidence: f64,
    /// "explicit_name" | "trigger:<t>" | "reference_previous"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_pattern: Option<String>,
}

impl InvocationMatch {
    pub fn none() -> Self {
        Self {
            is_invocation: false,
            skill_id: None,
            confidence: 0.0,
            matched_pattern: None,
        }
    }
}

// ============================================================================
// CONFLICTS
// ============================================================================

/// Kinds of detected conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Same entity + property, distinct values, overlapping validity
    TemporalOverlap,
    /// Two currently-valid facts disagree on the same property
    Contradiction,
    /// Same preference re-asserted more than a week apart
    PreferenceShift,
}

impl ConflictKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictKind::TemporalOverlap => "temporal_overlap",
            ConflictKind::Contradiction => "contradiction",
            ConflictKind::PreferenceShift => "preference_shift",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            ConflictKind::TemporalOverlap => Severity::High,
            ConflictKind::Contradiction => Severity::Medium,
            ConflictKind::PreferenceShift => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    Flagged,
    Resolved,
    Dismissed,
}

impl ResolutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStatus::Flagged => "flagged",
            ResolutionStatus::Resolved => "resolved",
            ResolutionStatus::Dismissed => "dismissed",
        }
    }
}

/// A persisted conflict between two facts (or decision rows)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub id: String,
    pub fact_id_1: String,
    pub fact_id_2: String,
    pub conflict_type: ConflictKind,
    pub description: String,
    pub severity: Severity,
    pub resolution_status: ResolutionStatus,
    pub namespace: String,
}

// ============================================================================
// WORKING TIER
// ============================================================================

/// A full conversation record in the bounded working tier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingRecord {
    /// Key within the tier
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    pub full_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub key_entities: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub user_intent: String,
}

impl WorkingRecord {
    pub fn new(conversation_id: impl Into<String>, full_text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            timestamp: Utc::now(),
            full_text: full_text.into(),
            embedding: None,
            key_entities: vec![],
            topics: vec![],
            user_intent: String::new(),
        }
    }
}

// ============================================================================
// RETRIEVAL
// ============================================================================

/// Provenance of a retrieved passage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassageSource {
    Working,
    Semantic,
    Procedural,
    Episodic,
    Hybrid,
}

impl PassageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PassageSource::Working => "working",
            PassageSource::Semantic => "semantic",
            PassageSource::Procedural => "procedural",
            PassageSource::Episodic => "episodic",
            PassageSource::Hybrid => "hybrid",
        }
    }
}

/// A ranked retrieval result with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredPassage {
    pub id: String,
    pub content: String,
    /// Relevance in (0, 1]; monotonically decreasing with rank
    pub similarity: f64,
    pub source: PassageSource,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// CONSOLIDATION
// ============================================================================

/// Outcome of one consolidation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationStats {
    pub memories_processed: usize,
    pub entities_created: usize,
    pub relationships_created: usize,
    pub conflicts_detected: usize,
    pub skills_proposed: usize,
    pub duration_ms: u64,
}

// ============================================================================
// TESTS
// ============================================================================
