//! Cache Adapter
//!
//! Key/value store with TTL plus sorted-set primitives, behind one trait so
//! the engine runs against a remote store (`redis.rs`) or fully in-process
//! (`memory.rs`) with identical semantics.
//!
//! Each logical use (working memory, skill cache, rate-limit counters,
//! consolidation lock) is bound to its own numeric database slot; a handle
//! only ever sees the keys of its slot.

mod memory;
mod redis;

pub use memory::MemoryCache;
pub use redis::RedisCache;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheSlot, Config};
use crate::error::Result;

/// Cache store operations. All complete in O(log n) against the backing
/// store; sorted-set members are unique strings scored by f64.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key` with a TTL. Overwrites and resets TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the value for `key`, or `None` on miss/expiry
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically increment an integer counter; missing keys start at 0
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Keys matching a glob-style pattern (`prefix:*`)
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Add (or rescore) a member in the sorted set at `key`
    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> Result<()>;

    /// Up to `limit` members in descending score order
    async fn sorted_range_desc(&self, key: &str, limit: usize) -> Result<Vec<(String, f64)>>;

    /// Count of members with score in `[min, max]`
    async fn sorted_count_range(&self, key: &str, min: f64, max: f64) -> Result<usize>;

    /// Remove members with score strictly below `score`; returns count removed
    async fn sorted_remove_below(&self, key: &str, score: f64) -> Result<usize>;

    /// Keep only the `k` highest-scored members, returning the removed ones
    async fn sorted_trim_to(&self, key: &str, k: usize) -> Result<Vec<String>>;

    /// Remove a single member; returns whether it was present
    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// Set or refresh the TTL of an existing key
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Take an advisory lock (set-if-absent with TTL); true when acquired
    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Release an advisory lock
    async fn release_lock(&self, key: &str) -> Result<()>;

    /// Round-trip health check
    async fn ping(&self) -> Result<()>;
}

/// Build one cache handle per logical slot. Remote when `REDIS_HOST` is
/// configured, in-process otherwise.
pub fn connect_slot(config: &Config, slot: CacheSlot) -> Arc<dyn CacheStore> {
    match &config.redis_host {
        Some(host) => Arc::new(RedisCache::new(
            host,
            config.redis_port,
            config.redis_password.as_deref(),
            slot.db_index(config),
            config.op_timeout,
        )),
        None => Arc::new(MemoryCache::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait-level behaviour is exercised against the in-process store; the
    // remote store shares these semantics by contract.
    async fn store() -> Arc<dyn CacheStore> {
        Arc::new(MemoryCache::new())
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = store().await;
        cache
            .set_with_ttl("k1", "v1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k1").await.unwrap(), Some("v1".to_string()));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = store().await;
        cache
            .set_with_ttl("short", "v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = store().await;
        cache
            .set_with_ttl("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_starts_at_zero() {
        let cache = store().await;
        assert_eq!(cache.incr("counter").await.unwrap(), 1);
        assert_eq!(cache.incr("counter").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sorted_set_ordering() {
        let cache = store().await;
        cache.sorted_add("z", "a", 1.0).await.unwrap();
        cache.sorted_add("z", "b", 3.0).await.unwrap();
        cache.sorted_add("z", "c", 2.0).await.unwrap();

        let range = cache.sorted_range_desc("z", 10).await.unwrap();
        let members: Vec<&str> = range.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(members, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_sorted_trim_returns_evicted() {
        let cache = store().await;
        for (member, score) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            cache.sorted_add("z", member, score).await.unwrap();
        }
        let removed = cache.sorted_trim_to("z", 2).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&"a".to_string()));
        assert!(removed.contains(&"b".to_string()));

        let remaining = cache.sorted_range_desc("z", 10).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].0, "d");
    }

    #[tokio::test]
    async fn test_sorted_count_range() {
        let cache = store().await;
        for i in 0..5 {
            cache
                .sorted_add("w", &format!("m{i}"), i as f64)
                .await
                .unwrap();
        }
        assert_eq!(cache.sorted_count_range("w", 1.0, 3.0).await.unwrap(), 3);
        assert_eq!(cache.sorted_count_range("w", 10.0, 20.0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let cache = store().await;
        assert!(cache.acquire_lock("lock", Duration::from_secs(60)).await.unwrap());
        assert!(!cache.acquire_lock("lock", Duration::from_secs(60)).await.unwrap());
        cache.release_lock("lock").await.unwrap();
        assert!(cache.acquire_lock("lock", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_pattern() {
        let cache = store().await;
        cache.set_with_ttl("qc:a:1", "x", Duration::from_secs(60)).await.unwrap();
        cache.set_with_ttl("qc:a:2", "y", Duration::from_secs(60)).await.unwrap();
        cache.set_with_ttl("qc:b:1", "z", Duration::from_secs(60)).await.unwrap();

        let mut keys = cache.keys("qc:a:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["qc:a:1".to_string(), "qc:a:2".to_string()]);
    }
}
