//! Engine Configuration
//!
//! All configuration is read from the environment once at startup. The
//! recognised variables are enumerated here; anything else is ignored.
//!
//! Remote services are optional: with `QDRANT_URL` / `REDIS_HOST` /
//! `EMBEDDING_SERVICE_URL` unset the engine selects in-process adapter
//! implementations with identical semantics.

use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;

/// Embedding dimensionality. The external embedder contract is a fixed
/// 1024-float vector; every stored vector and every collection uses this.
pub const EMBEDDING_DIM: usize = 1024;

/// Name of the vector collection holding memory embeddings
pub const MEMORY_COLLECTION: &str = "memory-vectors";

/// Default working-tier capacity (records per namespace)
pub const DEFAULT_WORKING_CAPACITY: usize = 5;

/// Default per-operation deadline for externally-awaited calls
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 30_000;

/// Default TTL for hybrid-search query cache entries
pub const QUERY_CACHE_TTL: Duration = Duration::from_secs(60);

// ============================================================================
// CACHE SLOTS
// ============================================================================

/// Logical cache database slots. Each logical use gets a dedicated numeric
/// database index in the underlying store so keys never collide across uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheSlot {
    /// General purpose: query cache, consolidation lock
    General,
    /// Working memory tier
    WorkingMemory,
    /// Skill sub-cache
    SkillCache,
    /// Rate-limit counters
    RateLimit,
}

impl CacheSlot {
    /// Numeric database index for this slot. Slots 3-5 are reserved for
    /// test isolation; the rate-limit slot is overridable via
    /// `RATE_LIMIT_REDIS_DB`.
    pub fn db_index(self, config: &Config) -> u8 {
        match self {
            CacheSlot::General => 0,
            CacheSlot::WorkingMemory => 1,
            CacheSlot::SkillCache => 2,
            CacheSlot::RateLimit => config.rate_limit_db,
        }
    }
}

// ============================================================================
// RATE LIMIT TIERS
// ============================================================================

/// Subscription tier controlling per-operation rate limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitTier {
    #[default]
    Standard,
    Premium,
    Unlimited,
}

impl RateLimitTier {
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "premium" => RateLimitTier::Premium,
            "unlimited" => RateLimitTier::Unlimited,
            _ => RateLimitTier::Standard,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RateLimitTier::Standard => "standard",
            RateLimitTier::Premium => "premium",
            RateLimitTier::Unlimited => "unlimited",
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Engine configuration, resolved from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for all Vesper data (`VESPER_HOME`, default `~/.vesper`)
    pub home: PathBuf,
    /// Path of the relational store file (`SQLITE_DB`,
    /// default `${VESPER_HOME}/data/memory.db`)
    pub sqlite_db: PathBuf,
    /// Remote vector service endpoint (`QDRANT_URL`); in-process index when unset
    pub qdrant_url: Option<String>,
    /// API key for the vector service (`QDRANT_API_KEY`)
    pub qdrant_api_key: Option<String>,
    /// Cache host (`REDIS_HOST`); in-process cache when unset
    pub redis_host: Option<String>,
    /// Cache port (`REDIS_PORT`, default 6379)
    pub redis_port: u16,
    /// Cache password (`REDIS_PASSWORD`)
    pub redis_password: Option<String>,
    /// Embedding service endpoint (`EMBEDDING_SERVICE_URL`); deterministic
    /// local vectoriser when unset
    pub embedding_service_url: Option<String>,
    /// Default rate-limit tier (`RATE_LIMIT_DEFAULT_TIER`)
    pub rate_limit_tier: RateLimitTier,
    /// Allow requests through when the limiter's control store is down
    /// (`RATE_LIMIT_FAIL_OPEN`, default false)
    pub rate_limit_fail_open: bool,
    /// Cache database index for rate-limit counters (`RATE_LIMIT_REDIS_DB`, default 4)
    pub rate_limit_db: u8,
    /// Working-tier capacity per namespace (`VESPER_WORKING_CAPACITY`, default 5)
    pub working_capacity: usize,
    /// Deadline for externally-awaited operations (`VESPER_OP_TIMEOUT_MS`)
    pub op_timeout: Duration,
}

impl Config {
    /// Resolve configuration from the environment
    pub fn from_env() -> Self {
        let home = std::env::var("VESPER_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home());

        let sqlite_db = std::env::var("SQLITE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join("data").join("memory.db"));

        Self {
            sqlite_db,
            qdrant_url: non_empty_var("QDRANT_URL"),
            qdrant_api_key: non_empty_var("QDRANT_API_KEY"),
            redis_host: non_empty_var("REDIS_HOST"),
            redis_port: parse_var("REDIS_PORT").unwrap_or(6379),
            redis_password: non_empty_var("REDIS_PASSWORD"),
            embedding_service_url: non_empty_var("EMBEDDING_SERVICE_URL"),
            rate_limit_tier: std::env::var("RATE_LIMIT_DEFAULT_TIER")
                .map(|v| RateLimitTier::parse_name(&v))
                .unwrap_or_default(),
            rate_limit_fail_open: std::env::var("RATE_LIMIT_FAIL_OPEN")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            rate_limit_db: parse_var("RATE_LIMIT_REDIS_DB").unwrap_or(4),
            working_capacity: parse_var("VESPER_WORKING_CAPACITY")
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_WORKING_CAPACITY),
            op_timeout: Duration::from_millis(
                parse_var("VESPER_OP_TIMEOUT_MS").unwrap_or(DEFAULT_OP_TIMEOUT_MS),
            ),
            home,
        }
    }

    /// Per-operation rate-limit override, e.g. `RATE_LIMIT_STORE_MEMORY=50`
    pub fn rate_limit_override(operation: &str) -> Option<u32> {
        let var = format!("RATE_LIMIT_{}", operation.to_uppercase());
        parse_var(&var)
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = default_home();
        Self {
            sqlite_db: home.join("data").join("memory.db"),
            qdrant_url: None,
            qdrant_api_key: None,
            redis_host: None,
            redis_port: 6379,
            redis_password: None,
            embedding_service_url: None,
            rate_limit_tier: RateLimitTier::Standard,
            rate_limit_fail_open: false,
            rate_limit_db: 4,
            working_capacity: DEFAULT_WORKING_CAPACITY,
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
            home,
        }
    }
}

fn default_home() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".vesper"))
        .unwrap_or_else(|| PathBuf::from(".vesper"))
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

// ============================================================================
// TESTS
// ============================================================================
