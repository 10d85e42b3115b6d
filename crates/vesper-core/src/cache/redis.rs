//! Remote Cache (Redis)
//!
//! `CacheStore` over a Redis instance via a shared `ConnectionManager`.
//! Every call is bounded by the configured operation deadline; connection
//! failures surface as `Cache` errors so the rate limiter can fail closed.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::OnceCell;

use crate::error::{Result, VesperError};

use super::CacheStore;

/// Remote cache store bound to one numeric database slot
pub struct RedisCache {
    url: String,
    timeout: Duration,
    manager: OnceCell<ConnectionManager>,
}

impl RedisCache {
    pub fn new(host: &str, port: u16, password: Option<&str>, db: u8, timeout: Duration) -> Self {
        let auth = password.map(|p| format!(":{p}@")).unwrap_or_default();
        Self {
            url: format!("redis://{auth}{host}:{port}/{db}"),
            timeout,
            manager: OnceCell::new(),
        }
    }

    async fn conn(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let client = Client::open(self.url.as_str())
                    .map_err(|e| VesperError::Cache(format!("invalid redis url: {e}")))?;
                tokio::time::timeout(self.timeout, ConnectionManager::new(client))
                    .await
                    .map_err(|_| VesperError::Timeout(self.timeout, "redis connect".into()))?
                    .map_err(|e| VesperError::Cache(format!("redis connect: {e}")))
            })
            .await?;
        Ok(manager.clone())
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| VesperError::Timeout(self.timeout, what.to_string()))?
            .map_err(|e| VesperError::Cache(format!("{what}: {e}")))
    }
}

#[async_trait::async_trait]
impl CacheStore for RedisCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let secs = ttl.as_secs().max(1);
        self.bounded("set", conn.set_ex(key, value, secs)).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        self.bounded("get", conn.get(key)).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = self.bounded("del", conn.del(key)).await?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        self.bounded("incr", conn.incr(key, 1)).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        self.bounded("keys", conn.keys(pattern)).await
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = self.bounded("zadd", conn.zadd(key, member, score)).await?;
        Ok(())
    }

    async fn sorted_range_desc(&self, key: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        let mut conn = self.conn().await?;
        let stop = limit.saturating_sub(1) as isize;
        self.bounded("zrevrange", conn.zrevrange_withscores(key, 0, stop))
            .await
    }

    async fn sorted_count_range(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        let mut conn = self.conn().await?;
        let count: i64 = self.bounded("zcount", conn.zcount(key, min, max)).await?;
        Ok(count as usize)
    }

    async fn sorted_remove_below(&self, key: &str, score: f64) -> Result<usize> {
        let mut conn = self.conn().await?;
        let removed: i64 = self
            .bounded(
                "zrembyscore",
                conn.zrembyscore(key, "-inf", format!("({score}")),
            )
            .await?;
        Ok(removed as usize)
    }

    async fn sorted_trim_to(&self, key: &str, k: usize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        // Lowest-scored members beyond the top k, oldest first
        let cut = -(k as isize) - 1;
        let removed: Vec<String> = self.bounded("zrange", conn.zrange(key, 0, cut)).await?;
        if !removed.is_empty() {
            let _: i64 = self
                .bounded(
                    "zremrangebyrank",
                    redis::cmd("ZREMRANGEBYRANK")
                        .arg(key)
                        .arg(0)
                        .arg(cut as i64)
                        .query_async(&mut conn),
                )
                .await?;
        }
        Ok(removed)
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = self.bounded("zrem", conn.zrem(key, member)).await?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: bool = self
            .bounded("expire", conn.expire(key, ttl.as_secs().max(1) as i64))
            .await?;
        Ok(())
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = self
            .bounded(
                "set nx",
                redis::cmd("SET")
                    .arg(key)
                    .arg("locked")
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl.as_secs().max(1))
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn release_lock(&self, key: &str) -> Result<()> {
        self.delete(key).await.map(|_| ())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = self
            .bounded("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}
