//! # Result Cache
//!
//! Sharded LRU over projected responses. Each shard has its own lock, so a
//! write to one key never blocks reads routed to other shards.
//!
//! TTL is enforced lazily: an expired entry found by `get` is removed and
//! reported as a miss.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::{QueryError, QueryResult};

/// A cached response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Arc<Value>,
    pub inserted_at: DateTime<Utc>,
    pub ttl: Duration,
    pub hit_count: u64,
}

impl CacheEntry {
    fn new(key: String, value: Value, ttl: Duration) -> Self {
        Self {
            key,
            value: Arc::new(value),
            inserted_at: Utc::now(),
            ttl,
            hit_count: 0,
        }
    }

    /// Whether the entry has outlived its TTL at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now.signed_duration_since(self.inserted_at) >= ttl,
            // Larger than chrono can represent
            Err(_) => false,
        }
    }
}

/// Counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Translate a `*`/`?` glob into an anchored regex
pub fn glob_to_regex(pattern: &str) -> QueryResult<Regex> {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source)
        .map_err(|e| QueryError::validation(format!("invalid invalidation pattern: {}", e)))
}

/// Sharded, capacity-bounded response cache
pub struct ResultCache {
    shards: Vec<Mutex<LruCache<String, CacheEntry>>>,
    default_ttl: Duration,
    enabled: bool,
    counters: Counters,
}

impl ResultCache {
    /// Create a cache holding at most `max_entries` across up to `shards`
    /// shards.
    ///
    /// Capacity is split exactly: the first `max_entries % shards` shards
    /// hold one extra entry. Never more shards than entries, so every shard
    /// holds at least one.
    pub fn new(max_entries: usize, shards: usize, default_ttl: Duration) -> Self {
        let max_entries = max_entries.max(1);
        let shard_count = shards.clamp(1, max_entries);
        let base = max_entries / shard_count;
        let extra = max_entries % shard_count;

        Self {
            shards: (0..shard_count)
                .map(|i| {
                    let capacity = if i < extra { base + 1 } else { base };
                    let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
                    Mutex::new(LruCache::new(capacity))
                })
                .collect(),
            default_ttl,
            enabled: true,
            counters: Counters::default(),
        }
    }

    /// Cache that never stores anything
    pub fn disabled() -> Self {
        let mut cache = Self::new(1, 1, Duration::ZERO);
        cache.enabled = false;
        cache
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn shard(&self, key: &str) -> &Mutex<LruCache<String, CacheEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    /// Look up a live entry
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        if !self.enabled {
            Counters::bump(&self.counters.misses, 1);
            return None;
        }

        let mut shard = self.shard(key).lock();
        let expired = match shard.get_mut(key) {
            None => {
                Counters::bump(&self.counters.misses, 1);
                return None;
            }
            Some(entry) if entry.is_expired_at(Utc::now()) => true,
            Some(entry) => {
                entry.hit_count += 1;
                Counters::bump(&self.counters.hits, 1);
                return Some(Arc::clone(&entry.value));
            }
        };

        if expired {
            shard.pop(key);
            Counters::bump(&self.counters.expirations, 1);
            Counters::bump(&self.counters.misses, 1);
        }
        None
    }

    /// Store `value` under `key`; `ttl` falls back to the default TTL
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        if !self.enabled {
            return;
        }

        let key = key.into();
        let entry = CacheEntry::new(key.clone(), value, ttl.unwrap_or(self.default_ttl));
        let mut shard = self.shard(&key).lock();
        if let Some((evicted, _)) = shard.push(key.clone(), entry) {
            if evicted != key {
                Counters::bump(&self.counters.evictions, 1);
            }
        }
        Counters::bump(&self.counters.inserts, 1);
    }

    /// Remove one entry; returns whether it existed
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.shard(key).lock().pop(key).is_some();
        if removed {
            Counters::bump(&self.counters.invalidations, 1);
        }
        removed
    }

    /// Remove every entry whose key matches the glob `pattern`
    pub fn delete_matching(&self, pattern: &str) -> QueryResult<usize> {
        let regex = glob_to_regex(pattern)?;
        let mut removed = 0;

        for shard in &self.shards {
            let mut shard = shard.lock();
            let doomed: Vec<String> = shard
                .iter()
                .filter(|(key, _)| regex.is_match(key))
                .map(|(key, _)| key.clone())
                .collect();
            for key in doomed {
                shard.pop(&key);
                removed += 1;
            }
        }

        Counters::bump(&self.counters.invalidations, removed as u64);
        Ok(removed)
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    /// Entries currently held, including expired ones not yet read
    /// Sum of every shard's capacity
    pub fn capacity(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().cap().get()).sum()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> CacheMetrics {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheMetrics {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            inserts: load(&self.counters.inserts),
            evictions: load(&self.counters.evictions),
            expirations: load(&self.counters.expirations),
            invalidations: load(&self.counters.invalidations),
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("shards", &self.shards.len())
            .field("enabled", &self.enabled)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}
