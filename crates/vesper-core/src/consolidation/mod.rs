//! Consolidation Pipeline
//!
//! Scheduled promotion of working-tier records into the semantic graph:
//! extract entities/relationships/facts, propose skills from procedural
//! intents, apply temporal decay, detect conflicts, and prune weak edges.
//! One run at a time across the process, guarded by a cache-adapter lock.

mod extract;
mod scheduler;

pub use extract::{
    extract, has_procedural_intent, is_novel_skill, propose_skill_name, Extraction,
};
pub use scheduler::ConsolidationScheduler;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::conflict::ConflictDetector;
use crate::error::{Result, VesperError};
use crate::model::{ConsolidationStats, EntityInput, Fact, RelationshipInput, SkillSpec};
use crate::storage::MemoryStore;
use crate::tiers::{SemanticMemory, SkillLibrary, WorkingMemory};

/// Edges weaker than this are prune candidates
const PRUNE_MIN_STRENGTH: f64 = 0.05;

/// Edges must also be unreinforced for this long before pruning
const PRUNE_CUTOFF_DAYS: i64 = 30;

/// Token-overlap threshold above which a proposed skill is not novel
const SKILL_NOVELTY_THRESHOLD: f64 = 0.6;

/// Advisory lock key and its safety TTL
const LOCK_KEY: &str = "consolidation:lock";
const LOCK_TTL: Duration = Duration::from_secs(15 * 60);

/// Completion callback: `(Some(stats), None)` on success,
/// `(None, Some(message))` on failure
pub type CompletionCallback = Box<dyn Fn(Option<&ConsolidationStats>, Option<&str>) + Send + Sync>;

/// The consolidation engine
pub struct Consolidator {
    store: Arc<MemoryStore>,
    working: Arc<WorkingMemory>,
    semantic: Arc<SemanticMemory>,
    skills: Arc<SkillLibrary>,
    conflicts: Arc<ConflictDetector>,
    lock_cache: Arc<dyn CacheStore>,
    run_count: AtomicU64,
    on_complete: Mutex<Option<CompletionCallback>>,
}

impl Consolidator {
    pub fn new(
        store: Arc<MemoryStore>,
        working: Arc<WorkingMemory>,
        semantic: Arc<SemanticMemory>,
        skills: Arc<SkillLibrary>,
        conflicts: Arc<ConflictDetector>,
        lock_cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            store,
            working,
            semantic,
            skills,
            conflicts,
            lock_cache,
            run_count: AtomicU64::new(0),
            on_complete: Mutex::new(None),
        }
    }

    /// Attempts so far, successful or not
    pub fn run_count(&self) -> u64 {
        self.run_count.load(Ordering::Relaxed)
    }

    /// Register the completion callback, replacing any previous one
    pub fn set_on_complete(&self, callback: CompletionCallback) {
        if let Ok(mut slot) = self.on_complete.lock() {
            *slot = Some(callback);
        }
    }

    fn notify(&self, stats: Option<&ConsolidationStats>, error: Option<&str>) {
        if let Ok(slot) = self.on_complete.lock() {
            if let Some(callback) = slot.as_ref() {
                callback(stats, error);
            }
        }
    }

    /// Run the pipeline across every namespace with working-tier activity.
    /// At most one run proceeds at a time; a failure in one namespace
    /// aborts that namespace only.
    pub async fn run(&self) -> Result<ConsolidationStats> {
        self.run_count.fetch_add(1, Ordering::Relaxed);

        if !self.lock_cache.acquire_lock(LOCK_KEY, LOCK_TTL).await? {
            tracing::info!("consolidation already in progress, skipping");
            return Ok(ConsolidationStats::default());
        }

        let started = Instant::now();
        let mut totals = ConsolidationStats::default();
        let mut first_error: Option<String> = None;

        // Lock is released on every exit path below
        let outcome = async {
            let namespaces = self.working.active_namespaces().await?;
            for namespace in namespaces {
                match self.run_namespace(&namespace).await {
                    Ok(stats) => {
                        totals.memories_processed += stats.memories_processed;
                        totals.entities_created += stats.entities_created;
                        totals.relationships_created += stats.relationships_created;
                        totals.conflicts_detected += stats.conflicts_detected;
                        totals.skills_proposed += stats.skills_proposed;
                    }
                    Err(e) => {
                        tracing::warn!(namespace = %namespace, error = %e, "consolidation failed for namespace");
                        first_error.get_or_insert_with(|| e.to_string());
                    }
                }
            }
            Ok::<(), VesperError>(())
        }
        .await;

        self.lock_cache.release_lock(LOCK_KEY).await?;
        outcome?;

        totals.duration_ms = started.elapsed().as_millis() as u64;
        match &first_error {
            Some(message) => self.notify(None, Some(message)),
            None => self.notify(Some(&totals), None),
        }
        tracing::info!(
            memories = totals.memories_processed,
            entities = totals.entities_created,
            relationships = totals.relationships_created,
            conflicts = totals.conflicts_detected,
            skills = totals.skills_proposed,
            duration_ms = totals.duration_ms,
            "consolidation run complete"
        );
        Ok(totals)
    }

    /// One namespace: read D, promote into E/F, decay, detect, prune
    pub async fn run_namespace(&self, namespace: &str) -> Result<ConsolidationStats> {
        let started = Instant::now();
        let mut stats = ConsolidationStats::default();

        let records = self
            .working
            .get_recent(namespace, self.working.capacity())
            .await?;
        stats.memories_processed = records.len();

        // Seeded with the catalog so repeated runs do not re-propose
        let mut proposed_names: Vec<String> = self
            .store
            .skills(namespace)?
            .into_iter()
            .map(|s| s.name)
            .collect();

        for record in &records {
            let extraction = extract::extract(record);

            for candidate in &extraction.entities {
                let entity = self.semantic.upsert_entity(
                    &EntityInput {
                        name: candidate.name.clone(),
                        entity_type: candidate.entity_type.clone(),
                        ..Default::default()
                    },
                    namespace,
                )?;
                if entity.access_count == 1 {
                    stats.entities_created += 1;
                }
            }

            for candidate in &extraction.relationships {
                let source = self.semantic.upsert_entity(
                    &EntityInput {
                        name: candidate.source.clone(),
                        entity_type: "concept".into(),
                        ..Default::default()
                    },
                    namespace,
                )?;
                let target = self.semantic.upsert_entity(
                    &EntityInput {
                        name: candidate.target.clone(),
                        entity_type: "concept".into(),
                        ..Default::default()
                    },
                    namespace,
                )?;
                self.semantic.upsert_relationship(
                    &RelationshipInput {
                        source_id: source.id,
                        target_id: target.id,
                        relation_type: candidate.relation_type.clone(),
                        strength: None,
                        evidence: Some(record.conversation_id.clone()),
                    },
                    namespace,
                )?;
                stats.relationships_created += 1;
            }

            for candidate in &extraction.facts {
                let entity = self.semantic.upsert_entity(
                    &EntityInput {
                        name: candidate.entity.clone(),
                        entity_type: "concept".into(),
                        ..Default::default()
                    },
                    namespace,
                )?;
                self.store.insert_fact(&Fact {
                    id: Uuid::new_v4().to_string(),
                    entity_id: entity.id,
                    property: candidate.property.clone(),
                    value: candidate.value.clone(),
                    confidence: 0.8,
                    valid_from: Some(record.timestamp),
                    valid_until: None,
                    source_conversation: Some(record.conversation_id.clone()),
                    namespace: namespace.to_string(),
                })?;
            }

            // Procedural intents become skill proposals, novelty-gated
            if extract::has_procedural_intent(record) {
                let name = extract::propose_skill_name(record);
                if extract::is_novel_skill(&name, &proposed_names, SKILL_NOVELTY_THRESHOLD) {
                    self.skills.add_skill(
                        &SkillSpec {
                            name: name.clone(),
                            description: record.full_text.clone(),
                            ..Default::default()
                        },
                        namespace,
                    )?;
                    proposed_names.push(name);
                    stats.skills_proposed += 1;
                }
            }
        }

        self.semantic.apply_temporal_decay(namespace)?;
        stats.conflicts_detected = self.conflicts.run(namespace)?;

        let cutoff = Utc::now() - chrono::Duration::days(PRUNE_CUTOFF_DAYS);
        let pruned = self
            .store
            .prune_relationships(namespace, PRUNE_MIN_STRENGTH, cutoff)?;
        if pruned > 0 {
            tracing::debug!(namespace = %namespace, pruned, "weak relationships pruned");
        }

        stats.duration_ms = started.elapsed().as_millis() as u64;
        Ok(stats)
    }
}

// ============================================================================
// TESTS
// ============================================================================
