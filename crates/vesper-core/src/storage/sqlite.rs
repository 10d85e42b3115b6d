//! SQLite Storage Implementation
//!
//! Core durable store behind the semantic and skill tiers and the tool
//! surface. Uses separate reader/writer connections for interior mutability:
//! all methods take `&self`, making the store `Send + Sync` behind `Arc`.
//!
//! Every multi-statement operation runs in a transaction; every read and
//! mutation is scoped by namespace.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, VesperError};
use crate::model::{
    ConflictKind, ConflictRecord, Entity, EntityInput, Fact, MemoryRecord, MemoryType,
    Relationship, RelationshipInput, ResolutionStatus, Severity, Skill,
};

/// Reinforcement step toward 1 for an existing relationship:
/// `s <- min(1, s + ALPHA * (1 - s))`
const REINFORCEMENT_ALPHA: f64 = 0.2;

/// Default initial strength for a new relationship
const DEFAULT_STRENGTH: f64 = 0.5;

/// Row cap for time-range scans
const TIME_RANGE_LIMIT: usize = 20;

/// Metadata for a completed backup
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    pub id: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub memory_count: i64,
}

/// Per-namespace statistics
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStats {
    pub namespace: String,
    pub memory_count: i64,
    pub entity_count: i64,
    pub skill_count: i64,
    pub decision_count: i64,
    pub agent_ids: Vec<String>,
    pub task_ids: Vec<String>,
    pub earliest_memory: Option<DateTime<Utc>>,
    pub latest_memory: Option<DateTime<Utc>>,
}

// ============================================================================
// STORE
// ============================================================================

/// Relational store over the embedded SQLite file
pub struct MemoryStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl MemoryStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) the store at `path`, applying pending migrations
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path)?;
        Self::configure_connection(&writer)?;
        super::migrations::apply_migrations(&writer)?;

        let reader = Connection::open(path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    fn write(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| VesperError::Internal("writer lock poisoned".into()))
    }

    fn read(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| VesperError::Internal("reader lock poisoned".into()))
    }

    /// Direct statement escape hatch for tests that need to age rows
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str, params: impl rusqlite::Params) -> Result<usize> {
        let writer = self.write()?;
        Ok(writer.execute(sql, params)?)
    }

    // ========================================================================
    // ROW MAPPING
    // ========================================================================

    fn parse_timestamp(value: &str, field: &str) -> rusqlite::Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("invalid {field} timestamp '{value}': {e}"),
                    )),
                )
            })
    }

    fn opt_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
        value.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
    }

    fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let last_accessed: String = row.get("last_accessed")?;
        let metadata_json: String = row.get("metadata")?;
        let type_name: String = row.get("memory_type")?;

        let metadata: Map<String, Value> = serde_json::from_str(&metadata_json).unwrap_or_default();

        Ok(MemoryRecord {
            id: row.get("id")?,
            content: row.get("content")?,
            memory_type: MemoryType::parse_name(&type_name).unwrap_or_default(),
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            updated_at: Self::parse_timestamp(&updated_at, "updated_at")?,
            importance: row.get("importance")?,
            access_count: row.get("access_count")?,
            last_accessed: Self::parse_timestamp(&last_accessed, "last_accessed")?,
            metadata,
            namespace: row.get("namespace")?,
            agent_id: row.get("agent_id")?,
            agent_role: row.get("agent_role")?,
            task_id: row.get("task_id")?,
        })
    }

    fn row_to_entity(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
        let created_at: String = row.get("created_at")?;
        let last_accessed: String = row.get("last_accessed")?;
        Ok(Entity {
            id: row.get("id")?,
            name: row.get("name")?,
            entity_type: row.get("entity_type")?,
            description: row.get("description")?,
            confidence: row.get("confidence")?,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            last_accessed: Self::parse_timestamp(&last_accessed, "last_accessed")?,
            access_count: row.get("access_count")?,
            namespace: row.get("namespace")?,
        })
    }

    fn row_to_relationship(row: &rusqlite::Row) -> rusqlite::Result<Relationship> {
        let created_at: String = row.get("created_at")?;
        let last_reinforced: String = row.get("last_reinforced")?;
        Ok(Relationship {
            id: row.get("id")?,
            source_id: row.get("source_id")?,
            target_id: row.get("target_id")?,
            relation_type: row.get("relation_type")?,
            strength: row.get("strength")?,
            evidence: row.get("evidence")?,
            created_at: Self::parse_timestamp(&created_at, "created_at")?,
            last_reinforced: Self::parse_timestamp(&last_reinforced, "last_reinforced")?,
            namespace: row.get("namespace")?,
        })
    }

    fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
        Ok(Fact {
            id: row.get("id")?,
            entity_id: row.get("entity_id")?,
            property: row.get("property")?,
            value: row.get("value")?,
            confidence: row.get("confidence")?,
            valid_from: Self::opt_timestamp(row.get("valid_from")?),
            valid_until: Self::opt_timestamp(row.get("valid_until")?),
            source_conversation: row.get("source_conversation")?,
            namespace: row.get("namespace")?,
        })
    }

    fn row_to_conflict(row: &rusqlite::Row) -> rusqlite::Result<ConflictRecord> {
        let kind: String = row.get("conflict_type")?;
        let severity: String = row.get("severity")?;
        let status: String = row.get("resolution_status")?;
        Ok(ConflictRecord {
            id: row.get("id")?,
            fact_id_1: row.get("fact_id_1")?,
            fact_id_2: row.get("fact_id_2")?,
            conflict_type: match kind.as_str() {
                "temporal_overlap" => ConflictKind::TemporalOverlap,
                "preference_shift" => ConflictKind::PreferenceShift,
                _ => ConflictKind::Contradiction,
            },
            description: row.get("description")?,
            severity: match severity.as_str() {
                "high" => Severity::High,
                "low" => Severity::Low,
                _ => Severity::Medium,
            },
            resolution_status: match status.as_str() {
                "resolved" => ResolutionStatus::Resolved,
                "dismissed" => ResolutionStatus::Dismissed,
                _ => ResolutionStatus::Flagged,
            },
            namespace: row.get("namespace")?,
        })
    }

    fn row_to_skill(row: &rusqlite::Row) -> rusqlite::Result<Skill> {
        let triggers_json: String = row.get("triggers")?;
        let prerequisites_json: String = row.get("prerequisites")?;
        let uses_json: String = row.get("uses_skills")?;
        let code_type: Option<String> = row.get("code_type")?;
        let is_archived: i64 = row.get("is_archived")?;
        Ok(Skill {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            summary: row.get("summary")?,
            category: row.get("category")?,
            triggers: serde_json::from_str(&triggers_json).unwrap_or_default(),
            success_count: row.get("success_count")?,
            failure_count: row.get("failure_count")?,
            avg_user_satisfaction: row.get("avg_user_satisfaction")?,
            is_archived: is_archived != 0,
            last_used: Self::opt_timestamp(row.get("last_used")?),
            code: row.get("code")?,
            code_type: code_type.as_deref().and_then(|s| match s {
                "inline" => Some(crate::model::CodeType::Inline),
                "reference" => Some(crate::model::CodeType::Reference),
                _ => None,
            }),
            prerequisites: serde_json::from_str(&prerequisites_json).unwrap_or_default(),
            uses_skills: serde_json::from_str(&uses_json).unwrap_or_default(),
            version: row.get("version")?,
            namespace: row.get("namespace")?,
        })
    }

    // ========================================================================
    // MEMORIES
    // ========================================================================

    /// Insert a memory row
    pub fn insert_memory(&self, record: &MemoryRecord) -> Result<()> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| VesperError::Internal(format!("metadata serialise: {e}")))?;
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO memories (
                id, content, memory_type, created_at, updated_at,
                importance, access_count, last_accessed, metadata,
                namespace, agent_id, agent_role, task_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id,
                record.content,
                record.memory_type.as_str(),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                record.importance,
                record.access_count,
                record.last_accessed.to_rfc3339(),
                metadata,
                record.namespace,
                record.agent_id,
                record.agent_role,
                record.task_id,
            ],
        )?;
        Ok(())
    }

    /// Fetch a memory row scoped by `(id, namespace)`
    pub fn get_memory(&self, id: &str, namespace: &str) -> Result<Option<MemoryRecord>> {
        let reader = self.read()?;
        let mut stmt =
            reader.prepare("SELECT * FROM memories WHERE id = ?1 AND namespace = ?2")?;
        let record = stmt
            .query_row(params![id, namespace], Self::row_to_memory)
            .optional()?;
        Ok(record)
    }

    /// Bump access counters on retrieved rows
    pub fn touch_memories(&self, ids: &[String], namespace: &str) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        let writer = self.write()?;
        let mut stmt = writer.prepare(
            "UPDATE memories SET access_count = access_count + 1, last_accessed = ?1
             WHERE id = ?2 AND namespace = ?3",
        )?;
        for id in ids {
            stmt.execute(params![now, id, namespace])?;
        }
        Ok(())
    }

    /// Delete a memory row and cascade to facts extracted from it in the
    /// same namespace. Returns `(row_deleted, facts_deleted)`.
    pub fn delete_memory(&self, id: &str, namespace: &str) -> Result<(bool, usize)> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM memories WHERE id = ?1 AND namespace = ?2",
            params![id, namespace],
        )?;
        let facts_deleted = if deleted > 0 {
            tx.execute(
                "DELETE FROM facts WHERE source_conversation = ?1 AND namespace = ?2",
                params![id, namespace],
            )?
        } else {
            0
        };
        tx.commit()?;
        Ok((deleted > 0, facts_deleted))
    }

    /// Recent rows by `created_at` desc, optionally filtered by type
    pub fn list_recent(
        &self,
        namespace: &str,
        limit: usize,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<MemoryRecord>> {
        let reader = self.read()?;
        let mut records = Vec::new();
        match memory_type {
            Some(mt) => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM memories WHERE namespace = ?1 AND memory_type = ?2
                     ORDER BY created_at DESC LIMIT ?3",
                )?;
                let rows =
                    stmt.query_map(params![namespace, mt.as_str(), limit as i64], Self::row_to_memory)?;
                for row in rows {
                    records.push(row?);
                }
            }
            None => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM memories WHERE namespace = ?1
                     ORDER BY created_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![namespace, limit as i64], Self::row_to_memory)?;
                for row in rows {
                    records.push(row?);
                }
            }
        }
        Ok(records)
    }

    /// Rows in a creation-time window, newest first, capped at 20
    pub fn memories_by_time_range(
        &self,
        namespace: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<MemoryRecord>> {
        let start = start.map(|t| t.to_rfc3339()).unwrap_or_default();
        let end = end
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "9999-12-31T23:59:59+00:00".to_string());
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM memories
             WHERE namespace = ?1 AND created_at >= ?2 AND created_at <= ?3
             ORDER BY created_at DESC LIMIT ?4",
        )?;
        let rows = stmt.query_map(params![namespace, start, end, TIME_RANGE_LIMIT as i64], Self::row_to_memory)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Rows for a context share, optionally filtered by task and substring
    pub fn list_for_share(
        &self,
        namespace: &str,
        task_id: Option<&str>,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        let reader = self.read()?;
        let pattern = query.map(|q| format!("%{q}%"));
        let mut stmt = reader.prepare(
            "SELECT * FROM memories
             WHERE namespace = ?1
               AND (?2 IS NULL OR task_id = ?2)
               AND (?3 IS NULL OR content LIKE ?3)
             ORDER BY created_at DESC LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![namespace, task_id, pattern, limit.unwrap_or(10_000) as i64],
            Self::row_to_memory,
        )?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Insert a decision row and mark the superseded decision (if any, in
    /// the same namespace) in one transaction. Returns whether a supersede
    /// link was applied.
    pub fn insert_decision(
        &self,
        record: &MemoryRecord,
        supersedes: Option<&str>,
    ) -> Result<bool> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;

        let mut superseded = false;
        if let Some(old_id) = supersedes {
            let old_metadata: Option<String> = tx
                .query_row(
                    "SELECT metadata FROM memories WHERE id = ?1 AND namespace = ?2",
                    params![old_id, record.namespace],
                    |row| row.get(0),
                )
                .optional()?;
            // Cross-namespace supersedes is a no-op
            if let Some(old_metadata) = old_metadata {
                let mut map: Map<String, Value> =
                    serde_json::from_str(&old_metadata).unwrap_or_default();
                map.insert("superseded_by".into(), Value::String(record.id.clone()));
                map.insert(
                    "superseded_at".into(),
                    Value::String(Utc::now().to_rfc3339()),
                );
                let updated = serde_json::to_string(&map)
                    .map_err(|e| VesperError::Internal(format!("metadata serialise: {e}")))?;
                tx.execute(
                    "UPDATE memories SET metadata = ?1, updated_at = ?2
                     WHERE id = ?3 AND namespace = ?4",
                    params![updated, Utc::now().to_rfc3339(), old_id, record.namespace],
                )?;
                superseded = true;
            }
        }

        // The new row records its side of the link only when the supersede
        // actually applied (same-namespace hit)
        let mut new_metadata = record.metadata.clone();
        if superseded {
            if let Some(old_id) = supersedes {
                new_metadata.insert("supersedes".into(), Value::String(old_id.to_string()));
            }
        }
        let metadata = serde_json::to_string(&new_metadata)
            .map_err(|e| VesperError::Internal(format!("metadata serialise: {e}")))?;

        tx.execute(
            "INSERT INTO memories (
                id, content, memory_type, created_at, updated_at,
                importance, access_count, last_accessed, metadata,
                namespace, agent_id, agent_role, task_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id,
                record.content,
                record.memory_type.as_str(),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                record.importance,
                record.access_count,
                record.last_accessed.to_rfc3339(),
                metadata,
                record.namespace,
                record.agent_id,
                record.agent_role,
                record.task_id,
            ],
        )?;
        tx.commit()?;
        Ok(superseded)
    }

    /// Decision rows not yet superseded
    pub fn live_decisions(&self, namespace: &str) -> Result<Vec<MemoryRecord>> {
        let decisions = self.list_recent(namespace, 10_000, Some(MemoryType::Decision))?;
        Ok(decisions.into_iter().filter(|d| !d.is_superseded()).collect())
    }

    // ========================================================================
    // ENTITIES
    // ========================================================================

    /// Insert or refresh an entity. Re-insert of an existing `(name, N)`
    /// bumps `last_accessed` and increments `access_count`.
    pub fn upsert_entity(&self, input: &EntityInput, namespace: &str) -> Result<Entity> {
        let now = Utc::now();
        let mut writer = self.write()?;
        let tx = writer.transaction()?;

        let existing = tx
            .query_row(
                "SELECT * FROM entities WHERE name = ?1 AND namespace = ?2",
                params![input.name, namespace],
                Self::row_to_entity,
            )
            .optional()?;

        let entity = match existing {
            Some(mut entity) => {
                entity.last_accessed = now;
                entity.access_count += 1;
                if let Some(description) = &input.description {
                    entity.description = Some(description.clone());
                }
                if let Some(confidence) = input.confidence {
                    entity.confidence = confidence.clamp(0.0, 1.0);
                }
                tx.execute(
                    "UPDATE entities SET last_accessed = ?1, access_count = ?2,
                        description = ?3, confidence = ?4
                     WHERE id = ?5",
                    params![
                        entity.last_accessed.to_rfc3339(),
                        entity.access_count,
                        entity.description,
                        entity.confidence,
                        entity.id,
                    ],
                )?;
                entity
            }
            None => {
                let entity = Entity {
                    id: Uuid::new_v4().to_string(),
                    name: input.name.clone(),
                    entity_type: input.entity_type.clone(),
                    description: input.description.clone(),
                    confidence: input.confidence.unwrap_or(0.8).clamp(0.0, 1.0),
                    created_at: now,
                    last_accessed: now,
                    access_count: 1,
                    namespace: namespace.to_string(),
                };
                tx.execute(
                    "INSERT INTO entities (
                        id, name, entity_type, description, confidence,
                        created_at, last_accessed, access_count, namespace
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        entity.id,
                        entity.name,
                        entity.entity_type,
                        entity.description,
                        entity.confidence,
                        entity.created_at.to_rfc3339(),
                        entity.last_accessed.to_rfc3339(),
                        entity.access_count,
                        entity.namespace,
                    ],
                )?;
                entity
            }
        };

        tx.commit()?;
        Ok(entity)
    }

    /// Fetch an entity by name within a namespace, bumping its access count
    pub fn get_entity(&self, name: &str, namespace: &str) -> Result<Option<Entity>> {
        let writer = self.write()?;
        let entity = writer
            .query_row(
                "SELECT * FROM entities WHERE name = ?1 AND namespace = ?2",
                params![name, namespace],
                Self::row_to_entity,
            )
            .optional()?;
        if let Some(entity) = &entity {
            writer.execute(
                "UPDATE entities SET access_count = access_count + 1, last_accessed = ?1
                 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), entity.id],
            )?;
        }
        Ok(entity.map(|mut e| {
            e.access_count += 1;
            e
        }))
    }

    pub fn entity_by_id(&self, id: &str, namespace: &str) -> Result<Option<Entity>> {
        let reader = self.read()?;
        let entity = reader
            .query_row(
                "SELECT * FROM entities WHERE id = ?1 AND namespace = ?2",
                params![id, namespace],
                Self::row_to_entity,
            )
            .optional()?;
        Ok(entity)
    }

    /// All entities in a namespace
    pub fn entities(&self, namespace: &str) -> Result<Vec<Entity>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM entities WHERE namespace = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![namespace], Self::row_to_entity)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }

    /// Entities with `entity_type = 'preference'`
    pub fn preferences(&self, namespace: &str) -> Result<Vec<Entity>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM entities WHERE namespace = ?1 AND entity_type = 'preference'",
        )?;
        let rows = stmt.query_map(params![namespace], Self::row_to_entity)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }

    // ========================================================================
    // RELATIONSHIPS
    // ========================================================================

    /// Insert or reinforce a relationship. Re-insert of the tuple key moves
    /// `strength` toward 1 without exceeding it and updates `last_reinforced`.
    pub fn upsert_relationship(
        &self,
        input: &RelationshipInput,
        namespace: &str,
    ) -> Result<Relationship> {
        let now = Utc::now();
        let mut writer = self.write()?;
        let tx = writer.transaction()?;

        let existing = tx
            .query_row(
                "SELECT * FROM relationships
                 WHERE source_id = ?1 AND target_id = ?2 AND relation_type = ?3 AND namespace = ?4",
                params![input.source_id, input.target_id, input.relation_type, namespace],
                Self::row_to_relationship,
            )
            .optional()?;

        let relationship = match existing {
            Some(mut rel) => {
                rel.strength = (rel.strength + REINFORCEMENT_ALPHA * (1.0 - rel.strength)).min(1.0);
                rel.last_reinforced = now;
                if let Some(evidence) = &input.evidence {
                    rel.evidence = Some(evidence.clone());
                }
                tx.execute(
                    "UPDATE relationships SET strength = ?1, last_reinforced = ?2, evidence = ?3
                     WHERE id = ?4",
                    params![
                        rel.strength,
                        rel.last_reinforced.to_rfc3339(),
                        rel.evidence,
                        rel.id,
                    ],
                )?;
                rel
            }
            None => {
                let rel = Relationship {
                    id: Uuid::new_v4().to_string(),
                    source_id: input.source_id.clone(),
                    target_id: input.target_id.clone(),
                    relation_type: input.relation_type.clone(),
                    strength: input.strength.unwrap_or(DEFAULT_STRENGTH).clamp(0.0, 1.0),
                    evidence: input.evidence.clone(),
                    created_at: now,
                    last_reinforced: now,
                    namespace: namespace.to_string(),
                };
                tx.execute(
                    "INSERT INTO relationships (
                        id, source_id, target_id, relation_type, strength,
                        evidence, created_at, last_reinforced, namespace
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        rel.id,
                        rel.source_id,
                        rel.target_id,
                        rel.relation_type,
                        rel.strength,
                        rel.evidence,
                        rel.created_at.to_rfc3339(),
                        rel.last_reinforced.to_rfc3339(),
                        rel.namespace,
                    ],
                )?;
                rel
            }
        };

        tx.commit()?;
        Ok(relationship)
    }

    /// All relationships in a namespace
    pub fn relationships(&self, namespace: &str) -> Result<Vec<Relationship>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare("SELECT * FROM relationships WHERE namespace = ?1")?;
        let rows = stmt.query_map(params![namespace], Self::row_to_relationship)?;
        let mut relationships = Vec::new();
        for row in rows {
            relationships.push(row?);
        }
        Ok(relationships)
    }

    /// Multiply every relationship's strength by `exp(-age_days / tau)`
    /// using `last_reinforced`. Returns rows updated.
    pub fn apply_temporal_decay(&self, namespace: &str, tau_days: f64) -> Result<usize> {
        let now = Utc::now();
        let relationships = self.relationships(namespace)?;

        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let mut updated = 0;
        for rel in relationships {
            let age_days =
                (now - rel.last_reinforced).num_seconds().max(0) as f64 / 86_400.0;
            let decayed = rel.strength * (-age_days / tau_days).exp();
            tx.execute(
                "UPDATE relationships SET strength = ?1 WHERE id = ?2",
                params![decayed, rel.id],
            )?;
            updated += 1;
        }
        tx.commit()?;
        Ok(updated)
    }

    /// Remove relationships below `min_strength` whose last reinforcement is
    /// older than `cutoff`
    pub fn prune_relationships(
        &self,
        namespace: &str,
        min_strength: f64,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        let writer = self.write()?;
        let removed = writer.execute(
            "DELETE FROM relationships
             WHERE namespace = ?1 AND strength < ?2 AND last_reinforced < ?3",
            params![namespace, min_strength, cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }

    // ========================================================================
    // FACTS
    // ========================================================================

    pub fn insert_fact(&self, fact: &Fact) -> Result<()> {
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO facts (
                id, entity_id, property, value, confidence,
                valid_from, valid_until, source_conversation, namespace
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                fact.id,
                fact.entity_id,
                fact.property,
                fact.value,
                fact.confidence,
                fact.valid_from.map(|t| t.to_rfc3339()),
                fact.valid_until.map(|t| t.to_rfc3339()),
                fact.source_conversation,
                fact.namespace,
            ],
        )?;
        Ok(())
    }

    pub fn facts_for_entity(&self, entity_id: &str, namespace: &str) -> Result<Vec<Fact>> {
        let reader = self.read()?;
        let mut stmt = reader
            .prepare("SELECT * FROM facts WHERE entity_id = ?1 AND namespace = ?2")?;
        let rows = stmt.query_map(params![entity_id, namespace], Self::row_to_fact)?;
        let mut facts = Vec::new();
        for row in rows {
            facts.push(row?);
        }
        Ok(facts)
    }

    // ========================================================================
    // CONFLICTS
    // ========================================================================

    /// Persist a detected conflict once per pair. On first insertion both
    /// involved facts drop to confidence 0.5 and the status is flagged.
    /// Returns whether the conflict was newly stored.
    pub fn store_conflict(&self, conflict: &ConflictRecord) -> Result<bool> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO conflicts (
                id, fact_id_1, fact_id_2, conflict_type, description,
                severity, resolution_status, created_at, namespace
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'flagged', ?7, ?8)",
            params![
                conflict.id,
                conflict.fact_id_1,
                conflict.fact_id_2,
                conflict.conflict_type.as_str(),
                conflict.description,
                conflict.severity.as_str(),
                Utc::now().to_rfc3339(),
                conflict.namespace,
            ],
        )?;
        if inserted > 0 {
            tx.execute(
                "UPDATE facts SET confidence = 0.5
                 WHERE id IN (?1, ?2) AND namespace = ?3",
                params![conflict.fact_id_1, conflict.fact_id_2, conflict.namespace],
            )?;
        }
        tx.commit()?;
        Ok(inserted > 0)
    }

    pub fn conflicts(&self, namespace: &str) -> Result<Vec<ConflictRecord>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare("SELECT * FROM conflicts WHERE namespace = ?1")?;
        let rows = stmt.query_map(params![namespace], Self::row_to_conflict)?;
        let mut conflicts = Vec::new();
        for row in rows {
            conflicts.push(row?);
        }
        Ok(conflicts)
    }

    // ========================================================================
    // SKILLS
    // ========================================================================

    pub fn insert_skill(&self, skill: &Skill) -> Result<()> {
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO skills (
                id, name, description, summary, category, triggers,
                success_count, failure_count, avg_user_satisfaction, is_archived,
                last_used, code, code_type, prerequisites, uses_skills, version, namespace
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                skill.id,
                skill.name,
                skill.description,
                skill.summary,
                skill.category,
                serde_json::to_string(&skill.triggers).unwrap_or_else(|_| "[]".into()),
                skill.success_count,
                skill.failure_count,
                skill.avg_user_satisfaction,
                skill.is_archived as i64,
                skill.last_used.map(|t| t.to_rfc3339()),
                skill.code,
                skill.code_type.map(|c| match c {
                    crate::model::CodeType::Inline => "inline",
                    crate::model::CodeType::Reference => "reference",
                }),
                serde_json::to_string(&skill.prerequisites).unwrap_or_else(|_| "[]".into()),
                serde_json::to_string(&skill.uses_skills).unwrap_or_else(|_| "[]".into()),
                skill.version,
                skill.namespace,
            ],
        )?;
        Ok(())
    }

    pub fn get_skill(&self, id: &str, namespace: &str) -> Result<Option<Skill>> {
        let reader = self.read()?;
        let skill = reader
            .query_row(
                "SELECT * FROM skills WHERE id = ?1 AND namespace = ?2",
                params![id, namespace],
                Self::row_to_skill,
            )
            .optional()?;
        Ok(skill)
    }

    /// Update `last_used` on invocation
    pub fn mark_skill_used(&self, id: &str, namespace: &str) -> Result<bool> {
        let writer = self.write()?;
        let updated = writer.execute(
            "UPDATE skills SET last_used = ?1 WHERE id = ?2 AND namespace = ?3",
            params![Utc::now().to_rfc3339(), id, namespace],
        )?;
        Ok(updated > 0)
    }

    /// Unarchived skills ranked by quality score (satisfaction x success
    /// rate), ties broken by success count then recency of use
    pub fn skill_summaries(
        &self,
        namespace: &str,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<Skill>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM skills
             WHERE namespace = ?1 AND is_archived = 0
               AND (?2 IS NULL OR category = ?2)
             ORDER BY
               avg_user_satisfaction * (CASE
                 WHEN success_count + failure_count > 0
                 THEN CAST(success_count AS REAL) / (success_count + failure_count)
                 ELSE avg_user_satisfaction END) DESC,
               success_count DESC,
               last_used DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![namespace, category, limit as i64], Self::row_to_skill)?;
        let mut skills = Vec::new();
        for row in rows {
            skills.push(row?);
        }
        Ok(skills)
    }

    /// All unarchived skills in a namespace
    pub fn skills(&self, namespace: &str) -> Result<Vec<Skill>> {
        let reader = self.read()?;
        let mut stmt = reader
            .prepare("SELECT * FROM skills WHERE namespace = ?1 AND is_archived = 0")?;
        let rows = stmt.query_map(params![namespace], Self::row_to_skill)?;
        let mut skills = Vec::new();
        for row in rows {
            skills.push(row?);
        }
        Ok(skills)
    }

    /// Record a successful outcome: bumps `success_count` and folds the
    /// satisfaction into the cumulative mean weighted by prior successes.
    pub fn record_skill_success(&self, id: &str, satisfaction: f64) -> Result<bool> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let existing: Option<(i64, f64)> = tx
            .query_row(
                "SELECT success_count, avg_user_satisfaction FROM skills WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((success_count, avg)) = existing else {
            return Ok(false);
        };
        let new_avg =
            (avg * success_count as f64 + satisfaction) / (success_count as f64 + 1.0);
        tx.execute(
            "UPDATE skills SET success_count = success_count + 1,
                avg_user_satisfaction = ?1, last_used = ?2
             WHERE id = ?3",
            params![new_avg, Utc::now().to_rfc3339(), id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Record a failed outcome: bumps `failure_count` only
    pub fn record_skill_failure(&self, id: &str) -> Result<bool> {
        let writer = self.write()?;
        let updated = writer.execute(
            "UPDATE skills SET failure_count = failure_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(updated > 0)
    }

    // ========================================================================
    // NAMESPACES & STATS
    // ========================================================================

    /// Union of distinct namespaces across memories, entities, and skills
    pub fn list_namespaces(&self) -> Result<Vec<String>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT namespace FROM memories
             UNION SELECT namespace FROM entities
             UNION SELECT namespace FROM skills
             ORDER BY namespace",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut namespaces = Vec::new();
        for row in rows {
            namespaces.push(row?);
        }
        Ok(namespaces)
    }

    fn scalar_count(&self, sql: &str, namespace: &str) -> Result<i64> {
        let reader = self.read()?;
        let count = reader.query_row(sql, params![namespace], |row| row.get(0))?;
        Ok(count)
    }

    pub fn memory_count(&self, namespace: &str) -> Result<i64> {
        self.scalar_count("SELECT COUNT(*) FROM memories WHERE namespace = ?1", namespace)
    }

    pub fn entity_count(&self, namespace: &str) -> Result<i64> {
        self.scalar_count("SELECT COUNT(*) FROM entities WHERE namespace = ?1", namespace)
    }

    pub fn skill_count(&self, namespace: &str) -> Result<i64> {
        self.scalar_count("SELECT COUNT(*) FROM skills WHERE namespace = ?1", namespace)
    }

    pub fn conflict_count(&self, namespace: &str) -> Result<i64> {
        self.scalar_count("SELECT COUNT(*) FROM conflicts WHERE namespace = ?1", namespace)
    }

    /// Aggregate statistics for one namespace
    pub fn namespace_stats(&self, namespace: &str) -> Result<NamespaceStats> {
        let reader = self.read()?;

        let (memory_count, decision_count): (i64, i64) = reader.query_row(
            "SELECT COUNT(*),
                    COUNT(CASE WHEN memory_type = 'decision' THEN 1 END)
             FROM memories WHERE namespace = ?1",
            params![namespace],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let entity_count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM entities WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        let skill_count: i64 = reader.query_row(
            "SELECT COUNT(*) FROM skills WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;

        let mut agent_ids = Vec::new();
        let mut stmt = reader.prepare(
            "SELECT DISTINCT agent_id FROM memories
             WHERE namespace = ?1 AND agent_id IS NOT NULL ORDER BY agent_id",
        )?;
        for row in stmt.query_map(params![namespace], |row| row.get::<_, String>(0))? {
            agent_ids.push(row?);
        }

        let mut task_ids = Vec::new();
        let mut stmt = reader.prepare(
            "SELECT DISTINCT task_id FROM memories
             WHERE namespace = ?1 AND task_id IS NOT NULL ORDER BY task_id",
        )?;
        for row in stmt.query_map(params![namespace], |row| row.get::<_, String>(0))? {
            task_ids.push(row?);
        }

        let (earliest, latest): (Option<String>, Option<String>) = reader.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM memories WHERE namespace = ?1",
            params![namespace],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(NamespaceStats {
            namespace: namespace.to_string(),
            memory_count,
            entity_count,
            skill_count,
            decision_count,
            agent_ids,
            task_ids,
            earliest_memory: Self::opt_timestamp(earliest),
            latest_memory: Self::opt_timestamp(latest),
        })
    }

    // ========================================================================
    // BACKUP
    // ========================================================================

    /// Copy the database into `dest_dir` using the online backup API and
    /// record the result in `backup_metadata`.
    pub fn backup(&self, dest_dir: &Path) -> Result<BackupInfo> {
        std::fs::create_dir_all(dest_dir)?;
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let dest = dest_dir.join(format!("vesper-{}.db", now.format("%Y%m%d-%H%M%S")));

        let memory_count: i64 = {
            let reader = self.read()?;
            reader.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?
        };

        {
            let reader = self.read()?;
            let mut dest_conn = Connection::open(&dest)?;
            let backup = rusqlite::backup::Backup::new(&reader, &mut dest_conn)?;
            backup.run_to_completion(100, std::time::Duration::from_millis(10), None)?;
        }

        let size_bytes = std::fs::metadata(&dest)?.len();
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO backup_metadata (id, path, created_at, size_bytes, memory_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                dest.to_string_lossy(),
                now.to_rfc3339(),
                size_bytes as i64,
                memory_count,
            ],
        )?;

        Ok(BackupInfo {
            id,
            path: dest,
            created_at: now,
            size_bytes,
            memory_count,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
