//! # Vesper Core
//!
//! Multi-tier agent memory engine. Persists conversational knowledge for
//! long-running AI assistants across isolated namespaces:
//!
//! - **Working tier**: bounded recency cache of full conversation records
//!   over the cache adapter, auto-evicting to capacity
//! - **Semantic tier**: durable entity-relationship-fact graph with
//!   personalized PageRank traversal and temporal decay
//! - **Skill library**: two-phase (summary / full) catalog of procedural
//!   know-how with lazy loading and outcome counters
//! - **Smart router**: regex query classification dispatching to the
//!   cheapest sufficient retrieval path
//! - **Hybrid search**: reciprocal-rank fusion of dense and sparse vector
//!   search with a short-lived query cache
//! - **Consolidation**: scheduled promotion of working-tier records into
//!   the graph, with decay, conflict detection, and edge pruning
//! - **Safety plane**: sliding-window rate limiting (fail-closed), schema
//!   validation, and identifier sanitisation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vesper_core::{Config, Vesper};
//!
//! let vesper = Vesper::new(Config::from_env()).await?;
//! let record = vesper.store_memory(input).await?;
//! let passages = vesper.retrieve_memory(query_input).await?;
//! ```
//!
//! External services (Qdrant, Redis, the embedding endpoint) are optional:
//! when their environment variables are unset the engine runs fully
//! in-process with identical semantics.

// ============================================================================
// MODULES
// ============================================================================

pub mod cache;
pub mod config;
pub mod conflict;
pub mod consolidation;
pub mod embed;
pub mod error;
pub mod limiter;
pub mod model;
pub mod router;
pub mod search;
pub mod storage;
pub mod tiers;
pub mod validate;
pub mod vector;

mod vesper;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use cache::{CacheStore, MemoryCache, RedisCache};
pub use config::{CacheSlot, Config, RateLimitTier, EMBEDDING_DIM, MEMORY_COLLECTION};
pub use conflict::ConflictDetector;
pub use consolidation::{ConsolidationScheduler, Consolidator};
pub use embed::{Embedder, HttpEmbedder, LocalEmbedder};
pub use error::{Result, VesperError};
pub use limiter::{RateLimitDecision, RateLimiter};
pub use model::{
    ConflictKind, ConflictRecord, ConsolidationStats, Entity, EntityInput, Fact, InvocationMatch,
    MemoryRecord, MemoryType, PassageSource, Relationship, RelationshipInput, ResolutionStatus,
    ScoredPassage, Severity, Skill, SkillSpec, SkillSummary, WorkingRecord, DEFAULT_NAMESPACE,
};
pub use router::{classify, Classification, QueryClass, SmartRouter};
pub use search::{reciprocal_rank_fusion, HybridSearch, HybridSearchConfig};
pub use storage::{BackupInfo, MemoryStore, NamespaceStats};
pub use tiers::{CachedSkill, SemanticMemory, SkillLibrary, WorkingMemory};
pub use validate::{
    parse_delete_memory, parse_get_stats, parse_list_recent, parse_load_skill,
    parse_namespace_stats, parse_record_skill_outcome, parse_retrieve_memory,
    parse_share_context, parse_store_decision, parse_store_memory, DeleteMemoryInput,
    GetStatsInput, ListRecentInput, LoadSkillInput, RecordSkillOutcomeInput,
    RetrieveMemoryInput, ShareContextInput, StoreDecisionInput, StoreMemoryInput,
};
pub use vector::{
    cosine_similarity, validate_collection_name, validate_vector, CollectionStats,
    MemoryVectorStore, QdrantStore, VectorHit, VectorStore,
};
pub use vesper::{DecisionOutcome, DeleteOutcome, ShareOutcome, Vesper};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
