//! In-Process Cache
//!
//! TTL map plus sorted sets behind a mutex. Expiry is lazy: entries are
//! dropped when touched or enumerated past their deadline. Used in tests
//! and whenever no remote cache is configured.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Result, VesperError};

use super::CacheStore;

enum Slot {
    Value(String),
    Counter(i64),
    Sorted(HashMap<String, f64>),
}

struct Entry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self) -> bool {
        self.expires_at.is_none_or(|deadline| Instant::now() < deadline)
    }
}

/// In-process cache store
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> Result<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| VesperError::Cache("cache lock poisoned".into()))?;
        entries.retain(|_, entry| entry.live());
        Ok(f(&mut entries))
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCache {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    slot: Slot::Value(value.to_string()),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| {
            entries.get(key).and_then(|entry| match &entry.slot {
                Slot::Value(v) => Some(v.clone()),
                Slot::Counter(n) => Some(n.to_string()),
                Slot::Sorted(_) => None,
            })
        })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.with_entries(|entries| entries.remove(key).is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                slot: Slot::Counter(0),
                expires_at: None,
            });
            match &mut entry.slot {
                Slot::Counter(n) => {
                    *n += 1;
                    *n
                }
                Slot::Value(v) => {
                    let n = v.parse::<i64>().unwrap_or(0) + 1;
                    entry.slot = Slot::Counter(n);
                    n
                }
                Slot::Sorted(_) => {
                    entry.slot = Slot::Counter(1);
                    1
                }
            }
        })
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let exact = !pattern.ends_with('*');
        self.with_entries(|entries| {
            entries
                .keys()
                .filter(|k| if exact { k.as_str() == pattern } else { k.starts_with(prefix) })
                .cloned()
                .collect()
        })
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> Result<()> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                slot: Slot::Sorted(HashMap::new()),
                expires_at: None,
            });
            if !matches!(entry.slot, Slot::Sorted(_)) {
                entry.slot = Slot::Sorted(HashMap::new());
            }
            if let Slot::Sorted(set) = &mut entry.slot {
                set.insert(member.to_string(), score);
            }
        })
    }

    async fn sorted_range_desc(&self, key: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        self.with_entries(|entries| {
            let Some(Entry { slot: Slot::Sorted(set), .. }) = entries.get(key) else {
                return vec![];
            };
            let mut members: Vec<(String, f64)> =
                set.iter().map(|(m, s)| (m.clone(), *s)).collect();
            members.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            members.truncate(limit);
            members
        })
    }

    async fn sorted_count_range(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.with_entries(|entries| {
            let Some(Entry { slot: Slot::Sorted(set), .. }) = entries.get(key) else {
                return 0;
            };
            set.values().filter(|&&s| s >= min && s <= max).count()
        })
    }

    async fn sorted_remove_below(&self, key: &str, score: f64) -> Result<usize> {
        self.with_entries(|entries| {
            let Some(Entry { slot: Slot::Sorted(set), .. }) = entries.get_mut(key) else {
                return 0;
            };
            let before = set.len();
            set.retain(|_, s| *s >= score);
            before - set.len()
        })
    }

    async fn sorted_trim_to(&self, key: &str, k: usize) -> Result<Vec<String>> {
        self.with_entries(|entries| {
            let Some(Entry { slot: Slot::Sorted(set), .. }) = entries.get_mut(key) else {
                return vec![];
            };
            if set.len() <= k {
                return vec![];
            }
            let mut members: Vec<(String, f64)> =
                set.iter().map(|(m, s)| (m.clone(), *s)).collect();
            members.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            let removed: Vec<String> = members.split_off(k).into_iter().map(|(m, _)| m).collect();
            for member in &removed {
                set.remove(member);
            }
            removed
        })
    }

    async fn sorted_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.with_entries(|entries| {
            let Some(Entry { slot: Slot::Sorted(set), .. }) = entries.get_mut(key) else {
                return false;
            };
            set.remove(member).is_some()
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.with_entries(|entries| {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
        })
    }

    async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.with_entries(|entries| {
            if entries.get(key).is_some() {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    slot: Slot::Value("locked".to_string()),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            true
        })
    }

    async fn release_lock(&self, key: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(key);
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incr_over_expired_counter_restarts() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("c", "41", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Entry expired; counter starts over rather than continuing from 41
        assert_eq!(cache.incr("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_promotes_string_value() {
        let cache = MemoryCache::new();
        cache.set_with_ttl("c", "9", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.incr("c").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_lock_expires() {
        let cache = MemoryCache::new();
        assert!(cache.acquire_lock("l", Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.acquire_lock("l", Duration::from_millis(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_rescore_existing_member() {
        let cache = MemoryCache::new();
        cache.sorted_add("z", "m", 1.0).await.unwrap();
        cache.sorted_add("z", "m", 5.0).await.unwrap();
        let range = cache.sorted_range_desc("z", 10).await.unwrap();
        assert_eq!(range, vec![("m".to_string(), 5.0)]);
    }
}
