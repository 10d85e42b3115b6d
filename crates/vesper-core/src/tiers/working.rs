//! Working Memory Tier
//!
//! Bounded recency cache of full conversation records over the cache
//! adapter. Each namespace keeps at most `capacity` records, indexed by a
//! timestamp-scored sorted set; storing past capacity evicts the oldest.
//! TTL is fixed at insert; access does not extend it.
//!
//! The skill sub-cache lives here too, on its own cache slot, so loaded
//! skills survive between invocations without another trip to the
//! relational store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheStore;
use crate::error::{Result, VesperError};
use crate::model::{PassageSource, ScoredPassage, Skill, WorkingRecord};

/// Default record TTL: one day
pub const DEFAULT_WORKING_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A cache-hit skill with its hit counter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSkill {
    pub skill: Skill,
    pub access_count: i64,
}

/// Bounded recency cache of conversation records
pub struct WorkingMemory {
    records: Arc<dyn CacheStore>,
    skills: Arc<dyn CacheStore>,
    capacity: usize,
}

fn record_key(namespace: &str, conversation_id: &str) -> String {
    format!("wm:{namespace}:{conversation_id}")
}

fn index_key(namespace: &str) -> String {
    format!("wmidx:{namespace}")
}

fn skill_key(id: &str) -> String {
    format!("skillcache:{id}")
}

fn skill_hits_key(id: &str) -> String {
    format!("skillcache:{id}:hits")
}

/// Fraction of query tokens found in the record's text fields
fn text_score(query: &str, record: &WorkingRecord) -> f64 {
    let tokens: Vec<String> = query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }

    let mut haystack = record.full_text.to_lowercase();
    haystack.push(' ');
    haystack.push_str(&record.user_intent.to_lowercase());
    for entity in &record.key_entities {
        haystack.push(' ');
        haystack.push_str(&entity.to_lowercase());
    }
    for topic in &record.topics {
        haystack.push(' ');
        haystack.push_str(&topic.to_lowercase());
    }

    let hits = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f64 / tokens.len() as f64
}

/// Coverage fraction of `wanted` names present in `present`
fn coverage(wanted: &[String], present: &[String]) -> f64 {
    if wanted.is_empty() {
        return 0.0;
    }
    let present: HashSet<String> = present.iter().map(|s| s.to_lowercase()).collect();
    let hits = wanted
        .iter()
        .filter(|w| present.contains(&w.to_lowercase()))
        .count();
    hits as f64 / wanted.len() as f64
}

impl WorkingMemory {
    pub fn new(
        records: Arc<dyn CacheStore>,
        skills: Arc<dyn CacheStore>,
        capacity: usize,
    ) -> Self {
        Self {
            records,
            skills,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ========================================================================
    // RECORDS
    // ========================================================================

    /// Store a record with the default TTL
    pub async fn store(&self, namespace: &str, record: &WorkingRecord) -> Result<()> {
        self.store_with_ttl(namespace, record, DEFAULT_WORKING_TTL).await
    }

    /// Store a record, index it by timestamp, and trim the namespace to
    /// capacity. Evicted records (oldest timestamps) are deleted.
    pub async fn store_with_ttl(
        &self,
        namespace: &str,
        record: &WorkingRecord,
        ttl: Duration,
    ) -> Result<()> {
        let payload = serde_json::to_string(record)
            .map_err(|e| VesperError::Internal(format!("record serialise: {e}")))?;

        self.records
            .set_with_ttl(&record_key(namespace, &record.conversation_id), &payload, ttl)
            .await?;
        self.records
            .sorted_add(
                &index_key(namespace),
                &record.conversation_id,
                record.timestamp.timestamp_millis() as f64,
            )
            .await?;

        let evicted = self
            .records
            .sorted_trim_to(&index_key(namespace), self.capacity)
            .await?;
        for conversation_id in evicted {
            self.records
                .delete(&record_key(namespace, &conversation_id))
                .await?;
        }
        Ok(())
    }

    /// Fetch a record by conversation id
    pub async fn get(&self, namespace: &str, conversation_id: &str) -> Result<Option<WorkingRecord>> {
        let Some(payload) = self.records.get(&record_key(namespace, conversation_id)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_str(&payload)
            .map_err(|e| VesperError::Internal(format!("record deserialise: {e}")))?;
        Ok(Some(record))
    }

    /// Up to `n` records in reverse-chronological order
    pub async fn get_recent(&self, namespace: &str, n: usize) -> Result<Vec<WorkingRecord>> {
        let n = n.min(self.capacity);
        let index = self.records.sorted_range_desc(&index_key(namespace), n).await?;
        let mut records = Vec::with_capacity(index.len());
        for (conversation_id, _) in index {
            if let Some(record) = self.get(namespace, &conversation_id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Namespaces that currently hold working-tier records
    pub async fn active_namespaces(&self) -> Result<Vec<String>> {
        let keys = self.records.keys("wmidx:*").await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix("wmidx:").map(str::to_string))
            .collect())
    }

    /// Passages ranked by textual overlap over text, entities, topics, and
    /// intent. Similarity is in (0, 1] and decreases with rank.
    pub async fn search(&self, namespace: &str, query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        let records = self.get_recent(namespace, self.capacity).await?;
        let mut passages: Vec<ScoredPassage> = records
            .into_iter()
            .filter_map(|record| {
                let score = text_score(query, &record);
                (score > 0.0).then(|| ScoredPassage {
                    id: record.conversation_id.clone(),
                    content: record.full_text.clone(),
                    similarity: score,
                    source: PassageSource::Working,
                    timestamp: record.timestamp,
                })
            })
            .collect();
        passages.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        passages.truncate(k);
        Ok(passages)
    }

    /// Records containing any of the given entity names, scored by coverage
    pub async fn search_by_entities(
        &self,
        namespace: &str,
        names: &[String],
        k: usize,
    ) -> Result<Vec<(WorkingRecord, f64)>> {
        self.search_by_field(namespace, names, k, |record| &record.key_entities)
            .await
    }

    /// Records covering the given topics, scored by coverage
    pub async fn search_by_topics(
        &self,
        namespace: &str,
        topics: &[String],
        k: usize,
    ) -> Result<Vec<(WorkingRecord, f64)>> {
        self.search_by_field(namespace, topics, k, |record| &record.topics)
            .await
    }

    async fn search_by_field(
        &self,
        namespace: &str,
        wanted: &[String],
        k: usize,
        field: impl Fn(&WorkingRecord) -> &Vec<String>,
    ) -> Result<Vec<(WorkingRecord, f64)>> {
        let records = self.get_recent(namespace, self.capacity).await?;
        let mut scored: Vec<(WorkingRecord, f64)> = records
            .into_iter()
            .filter_map(|record| {
                let score = coverage(wanted, field(&record));
                (score > 0.0).then_some((record, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    // ========================================================================
    // SKILL SUB-CACHE
    // ========================================================================

    /// Cache a loaded skill for `ttl`
    pub async fn cache_skill(&self, skill: &Skill, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(skill)
            .map_err(|e| VesperError::Internal(format!("skill serialise: {e}")))?;
        self.skills.set_with_ttl(&skill_key(&skill.id), &payload, ttl).await?;
        // Reset the hit counter alongside the entry
        self.skills.delete(&skill_hits_key(&skill.id)).await?;
        Ok(())
    }

    /// Cache hit returns the skill with its atomically-incremented hit
    /// counter; miss or TTL expiry returns `None`.
    pub async fn get_cached_skill(&self, id: &str) -> Result<Option<CachedSkill>> {
        let Some(payload) = self.skills.get(&skill_key(id)).await? else {
            return Ok(None);
        };
        let skill: Skill = serde_json::from_str(&payload)
            .map_err(|e| VesperError::Internal(format!("skill deserialise: {e}")))?;
        let access_count = self.skills.incr(&skill_hits_key(id)).await?;
        Ok(Some(CachedSkill { skill, access_count }))
    }

    pub async fn invalidate_skill_cache(&self, id: &str) -> Result<()> {
        self.skills.delete(&skill_key(id)).await?;
        self.skills.delete(&skill_hits_key(id)).await?;
        Ok(())
    }

    pub async fn cached_skill_ids(&self) -> Result<Vec<String>> {
        let keys = self.skills.keys("skillcache:*").await?;
        Ok(keys
            .into_iter()
            .filter(|k| !k.ends_with(":hits"))
            .filter_map(|k| k.strip_prefix("skillcache:").map(str::to_string))
            .collect())
    }

    pub async fn clear_skill_cache(&self) -> Result<usize> {
        let keys = self.skills.keys("skillcache:*").await?;
        let mut cleared = 0;
        for key in keys {
            if self.skills.delete(&key).await? && !key.ends_with(":hits") {
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

// ============================================================================
// TESTS
// ============================================================================
