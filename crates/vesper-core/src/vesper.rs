//! Engine Facade
//!
//! Wires the adapters, tiers, router, limiter, and consolidation pipeline
//! into one handle the tool surface talks to. Every operation here is
//! namespace-scoped; the enable/disable toggle is a process-local atomic the
//! tool layer consults before dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};

use crate::cache;
use crate::config::{CacheSlot, Config, EMBEDDING_DIM};
use crate::conflict::ConflictDetector;
use crate::consolidation::{ConsolidationScheduler, Consolidator};
use crate::embed::{self, Embedder};
use crate::error::Result;
use crate::limiter::{RateLimitDecision, RateLimiter};
use crate::model::{
    ConsolidationStats, MemoryRecord, MemoryType, PassageSource, ScoredPassage,
    DECISION_DECAY_FACTOR,
};
use crate::router::SmartRouter;
use crate::search::HybridSearch;
use crate::storage::{BackupInfo, MemoryStore, NamespaceStats};
use crate::tiers::{CachedSkill, SemanticMemory, SkillLibrary, WorkingMemory};
use crate::validate::{
    DeleteMemoryInput, GetStatsInput, ListRecentInput, RecordSkillOutcomeInput,
    RetrieveMemoryInput, ShareContextInput, StoreDecisionInput, StoreMemoryInput,
};
use crate::vector::{self, VectorStore};

/// Embedder input cap; longer content embeds its prefix
const EMBED_INPUT_CHARS: usize = 8_000;

/// Outcome of `delete_memory`
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<String>,
    pub namespace: String,
    pub message: String,
}

/// Outcome of `share_context`
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareOutcome {
    pub memories: usize,
    pub entities: usize,
    pub handoff_id: String,
}

/// Outcome of `store_decision`
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionOutcome {
    pub decision_id: String,
    pub conflicts_detected: usize,
}

/// The assembled engine
pub struct Vesper {
    config: Config,
    store: Arc<MemoryStore>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    working: Arc<WorkingMemory>,
    semantic: Arc<SemanticMemory>,
    skills: Arc<SkillLibrary>,
    hybrid: Arc<HybridSearch>,
    router: SmartRouter,
    limiter: RateLimiter,
    conflicts: Arc<ConflictDetector>,
    consolidator: Arc<Consolidator>,
    scheduler: ConsolidationScheduler,
    active: AtomicBool,
}

impl Vesper {
    /// Assemble the engine from configuration. Remote adapters are selected
    /// when their endpoints are configured; in-process implementations
    /// otherwise. The vector collection is initialised before returning.
    pub async fn new(config: Config) -> Result<Self> {
        let store = Arc::new(MemoryStore::open(&config.sqlite_db)?);
        let vectors = vector::connect(&config, EMBEDDING_DIM)?;
        vectors.initialize_collection(EMBEDDING_DIM).await?;
        let embedder = embed::connect(&config)?;

        tracing::info!(
            vector_backend = if config.qdrant_url.is_some() { "qdrant" } else { "in-process" },
            cache_backend = if config.redis_host.is_some() { "redis" } else { "in-process" },
            embedder = if config.embedding_service_url.is_some() { "http" } else { "local" },
            db = %config.sqlite_db.display(),
            "vesper engine starting"
        );

        let working = Arc::new(WorkingMemory::new(
            cache::connect_slot(&config, CacheSlot::WorkingMemory),
            cache::connect_slot(&config, CacheSlot::SkillCache),
            config.working_capacity,
        ));
        let semantic = Arc::new(SemanticMemory::new(Arc::clone(&store)));
        let skills = Arc::new(SkillLibrary::new(Arc::clone(&store)));
        let general_cache = cache::connect_slot(&config, CacheSlot::General);
        let hybrid = Arc::new(HybridSearch::new(
            Arc::clone(&vectors),
            Arc::clone(&embedder),
            Arc::clone(&general_cache),
        ));
        let router = SmartRouter::new(
            Arc::clone(&working),
            Arc::clone(&semantic),
            Arc::clone(&skills),
            Arc::clone(&hybrid),
        );
        let limiter = RateLimiter::new(
            cache::connect_slot(&config, CacheSlot::RateLimit),
            &config,
        );
        let conflicts = Arc::new(ConflictDetector::new(Arc::clone(&store)));
        let consolidator = Arc::new(Consolidator::new(
            Arc::clone(&store),
            Arc::clone(&working),
            Arc::clone(&semantic),
            Arc::clone(&skills),
            Arc::clone(&conflicts),
            general_cache,
        ));
        let scheduler = ConsolidationScheduler::new(Arc::clone(&consolidator));

        Ok(Self {
            config,
            store,
            vectors,
            embedder,
            working,
            semantic,
            skills,
            hybrid,
            router,
            limiter,
            conflicts,
            consolidator,
            scheduler,
            active: AtomicBool::new(true),
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn working(&self) -> &Arc<WorkingMemory> {
        &self.working
    }

    pub fn semantic(&self) -> &Arc<SemanticMemory> {
        &self.semantic
    }

    pub fn skills(&self) -> &Arc<SkillLibrary> {
        &self.skills
    }

    pub fn conflicts(&self) -> &Arc<ConflictDetector> {
        &self.conflicts
    }

    pub fn consolidator(&self) -> &Arc<Consolidator> {
        &self.consolidator
    }

    pub fn scheduler(&self) -> &ConsolidationScheduler {
        &self.scheduler
    }

    // ========================================================================
    // CONTROL PLANE
    // ========================================================================

    /// Process-local active flag the tool layer consults
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
        tracing::info!(active, "vesper toggled");
    }

    /// Rate-gate `operation` for `subject`. Raises 503-flavoured
    /// `RateLimited` when the control store is down and fail-closed holds.
    pub async fn check_rate_limit(
        &self,
        subject: &str,
        operation: &str,
    ) -> Result<RateLimitDecision> {
        self.limiter.check_limit(subject, operation).await
    }

    // ========================================================================
    // TOOL OPERATIONS
    // ========================================================================

    /// Insert a memory row, embed its content, and write the sibling vector
    /// with wait-for-commit. The vector write failing rolls the row back.
    pub async fn store_memory(&self, input: StoreMemoryInput) -> Result<MemoryRecord> {
        let mut record = MemoryRecord::new(input.content, input.memory_type, input.namespace);
        record.metadata = input.metadata;
        record.agent_id = input.agent_id;
        record.agent_role = input.agent_role;
        record.task_id = input.task_id;

        self.store.insert_memory(&record)?;

        if let Err(e) = self.upsert_memory_vector(&record).await {
            // No partial state: the row does not outlive its failed vector
            let _ = self.store.delete_memory(&record.id, &record.namespace);
            return Err(e);
        }

        self.hybrid.invalidate_namespace(&record.namespace).await?;
        tracing::debug!(id = %record.id, namespace = %record.namespace, "memory stored");
        Ok(record)
    }

    async fn upsert_memory_vector(&self, record: &MemoryRecord) -> Result<()> {
        let prefix: String = record.content.chars().take(EMBED_INPUT_CHARS).collect();
        let vector = self.embedder.embed(&prefix).await?;
        self.vectors
            .upsert(
                &record.id,
                &vector,
                json!({
                    "content": record.content,
                    "memoryType": record.memory_type.as_str(),
                    "namespace": record.namespace,
                    "createdAt": record.created_at.to_rfc3339(),
                    "agentId": record.agent_id,
                    "taskId": record.task_id,
                }),
            )
            .await
    }

    /// Route a query through the classifier and tiers. Results carry
    /// provenance; retrieved memory rows get their access counters bumped.
    pub async fn retrieve_memory(
        &self,
        input: RetrieveMemoryInput,
    ) -> Result<Vec<ScoredPassage>> {
        let mut passages = self
            .router
            .retrieve(&input.namespace, &input.query, input.max_results)
            .await?;

        if let Some(types) = &input.memory_types {
            let allowed: Vec<PassageSource> = types
                .iter()
                .map(|t| match t {
                    MemoryType::Episodic => PassageSource::Episodic,
                    MemoryType::Procedural => PassageSource::Procedural,
                    MemoryType::Semantic | MemoryType::Decision => PassageSource::Semantic,
                })
                .collect();
            passages.retain(|p| {
                allowed.contains(&p.source)
                    || p.source == PassageSource::Hybrid
                    || p.source == PassageSource::Working
            });
        }

        let ids: Vec<String> = passages.iter().map(|p| p.id.clone()).collect();
        self.store.touch_memories(&ids, &input.namespace)?;
        Ok(passages)
    }

    /// Simple index scan on `created_at` desc
    pub fn list_recent(&self, input: ListRecentInput) -> Result<Vec<MemoryRecord>> {
        self.store
            .list_recent(&input.namespace, input.limit, input.memory_type)
    }

    /// Remove a memory row scoped by `(id, namespace)`, cascading to facts
    /// extracted from it in the same namespace, plus its vector. Idempotent:
    /// the second call reports "Memory not found".
    pub async fn delete_memory(&self, input: DeleteMemoryInput) -> Result<DeleteOutcome> {
        if input.id.is_empty() {
            return Ok(DeleteOutcome {
                success: false,
                deleted: None,
                namespace: input.namespace,
                message: "Memory id is required".into(),
            });
        }

        let (deleted, facts_deleted) = self.store.delete_memory(&input.id, &input.namespace)?;
        if !deleted {
            return Ok(DeleteOutcome {
                success: false,
                deleted: None,
                namespace: input.namespace,
                message: "Memory not found".into(),
            });
        }

        self.vectors.delete_by_id(&input.id).await?;
        self.hybrid.invalidate_namespace(&input.namespace).await?;
        Ok(DeleteOutcome {
            success: true,
            deleted: Some(input.id),
            namespace: input.namespace,
            message: format!("Memory deleted ({facts_deleted} extracted facts removed)"),
        })
    }

    /// Bundle the source namespace's rows and entities and write a single
    /// episodic handoff row into the target namespace. Source data is
    /// unchanged; source-equals-target is legal.
    pub async fn share_context(&self, input: ShareContextInput) -> Result<ShareOutcome> {
        let memories = self.store.list_for_share(
            &input.source_namespace,
            input.task_id.as_deref(),
            input.query.as_deref(),
            input.limit,
        )?;
        let entities = self.store.entities(&input.source_namespace)?;

        let mut handoff = MemoryRecord::new(
            format!(
                "Context handoff from '{}': {} memories, {} entities",
                input.source_namespace,
                memories.len(),
                entities.len()
            ),
            MemoryType::Episodic,
            input.target_namespace.clone(),
        );
        handoff.task_id = input.task_id.clone();
        handoff.metadata.insert("source_namespace".into(), json!(input.source_namespace));
        handoff.metadata.insert("target_namespace".into(), json!(input.target_namespace));
        handoff.metadata.insert("memories_shared".into(), json!(memories.len()));
        handoff.metadata.insert("entities_shared".into(), json!(entities.len()));
        if let Some(task_id) = &input.task_id {
            handoff.metadata.insert("task_id".into(), json!(task_id));
        }
        handoff.metadata.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));

        self.store.insert_memory(&handoff)?;
        if let Err(e) = self.upsert_memory_vector(&handoff).await {
            let _ = self.store.delete_memory(&handoff.id, &handoff.namespace);
            return Err(e);
        }
        self.hybrid.invalidate_namespace(&input.target_namespace).await?;

        tracing::info!(
            source = %input.source_namespace,
            target = %input.target_namespace,
            memories = memories.len(),
            entities = entities.len(),
            "context shared"
        );
        Ok(ShareOutcome {
            memories: memories.len(),
            entities: entities.len(),
            handoff_id: handoff.id,
        })
    }

    /// Write a decision row (decay factor 0.25), apply the supersede link
    /// in the same transaction, then detect conflicts against live
    /// decisions. Conflicts are returned, never raised.
    pub async fn store_decision(&self, input: StoreDecisionInput) -> Result<DecisionOutcome> {
        let mut record =
            MemoryRecord::new(input.content, MemoryType::Decision, input.namespace.clone());
        record
            .metadata
            .insert("decay_factor".into(), json!(DECISION_DECAY_FACTOR));
        if let Some(rationale) = &input.rationale {
            record.metadata.insert("rationale".into(), json!(rationale));
        }

        self.store
            .insert_decision(&record, input.supersedes.as_deref())?;

        if let Err(e) = self.upsert_memory_vector(&record).await {
            let _ = self.store.delete_memory(&record.id, &record.namespace);
            return Err(e);
        }
        self.hybrid.invalidate_namespace(&input.namespace).await?;

        let candidates = self
            .conflicts
            .conflicts_against_decision(&record, &input.namespace)?;
        let conflicts_detected = self.conflicts.store_conflicts(&candidates)?;

        Ok(DecisionOutcome {
            decision_id: record.id,
            conflicts_detected,
        })
    }

    /// Union of distinct namespaces across memories, entities, skills
    pub fn list_namespaces(&self) -> Result<Vec<String>> {
        self.store.list_namespaces()
    }

    pub fn namespace_stats(&self, namespace: &str) -> Result<NamespaceStats> {
        self.store.namespace_stats(namespace)
    }

    /// Record a skill outcome and drop any cached copy so stale quality
    /// numbers never serve from the sub-cache
    pub async fn record_skill_outcome(&self, input: RecordSkillOutcomeInput) -> Result<bool> {
        let updated = if input.success {
            self.skills
                .record_success(&input.skill_id, input.satisfaction.unwrap_or(0.5))?
        } else {
            self.skills.record_failure(&input.skill_id)?
        };
        if updated {
            self.working.invalidate_skill_cache(&input.skill_id).await?;
        }
        Ok(updated)
    }

    /// Load a full skill row, preferring the sub-cache; a store hit is
    /// cached for subsequent invocations
    pub async fn load_skill(&self, skill_id: &str, namespace: &str) -> Result<Option<CachedSkill>> {
        if let Some(cached) = self.working.get_cached_skill(skill_id).await? {
            return Ok(Some(cached));
        }
        let Some(skill) = self.skills.load_full(skill_id, namespace)? else {
            return Ok(None);
        };
        self.working
            .cache_skill(&skill, std::time::Duration::from_secs(300))
            .await?;
        Ok(Some(CachedSkill {
            skill,
            access_count: 0,
        }))
    }

    /// Manual consolidation trigger
    pub async fn consolidate_now(&self) -> Result<ConsolidationStats> {
        self.consolidator.run().await
    }

    /// Online backup into `${VESPER_HOME}/backups`
    pub fn backup(&self) -> Result<BackupInfo> {
        self.store.backup(&self.config.home.join("backups"))
    }

    // ========================================================================
    // STATS
    // ========================================================================

    /// Namespace-scoped statistics; `detailed` adds adapter health, the
    /// vector collection status, and consolidation counters.
    pub async fn get_stats(&self, input: GetStatsInput) -> Result<Value> {
        let namespace = &input.namespace;
        let memory_count = self.store.memory_count(namespace)?;
        let entity_count = self.store.entity_count(namespace)?;
        let skill_count = self.store.skill_count(namespace)?;
        let conflict_count = self.store.conflict_count(namespace)?;
        let working = self
            .working
            .get_recent(namespace, self.config.working_capacity)
            .await?;

        let status = if memory_count == 0 && entity_count == 0 {
            "empty"
        } else {
            "healthy"
        };

        let mut stats = json!({
            "namespace": namespace,
            "status": status,
            "active": self.is_active(),
            "memoryCount": memory_count,
            "entityCount": entity_count,
            "skillCount": skill_count,
            "conflictCount": conflict_count,
            "workingCount": working.len(),
            "workingCapacity": self.config.working_capacity,
        });

        if input.detailed {
            let collection = match self.vectors.collection_stats().await {
                Ok(info) => json!({"pointsCount": info.points_count, "status": info.status}),
                Err(e) => json!({"status": "unreachable", "error": e.to_string()}),
            };
            let namespaces = self.store.list_namespaces()?;
            let ns_stats = self.store.namespace_stats(namespace)?;
            stats["vectorCollection"] = collection;
            stats["namespaces"] = json!(namespaces);
            stats["decisionCount"] = json!(ns_stats.decision_count);
            stats["agentIds"] = json!(ns_stats.agent_ids);
            stats["taskIds"] = json!(ns_stats.task_ids);
            stats["consolidationRuns"] = json!(self.consolidator.run_count());
            stats["schedulerRunning"] = json!(self.scheduler.is_running());
        }

        Ok(stats)
    }

    /// Store a full skill row directly (exposed for consolidation tests and
    /// embedders of the library)
    pub fn library(&self) -> &SkillLibrary {
        &self.skills
    }

    /// Direct hybrid-search access for callers outside the router
    pub fn hybrid(&self) -> &Arc<HybridSearch> {
        &self.hybrid
    }

    /// Vector adapter accessor (stats, maintenance)
    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    /// Embedder accessor
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }
}

impl std::fmt::Debug for Vesper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vesper")
            .field("active", &self.is_active())
            .field("db", &self.config.sqlite_db)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
