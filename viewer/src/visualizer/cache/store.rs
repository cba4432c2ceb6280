//! One keyed store with its own capacity, eviction policy and statistics.
//!
//! Recency and insertion order use a logical sequence counter rather than the
//! clock, so ordering stays deterministic when several operations land within
//! the same clock tick. The clock is only consulted for TTL expiry.

use crate::clock::SharedClock;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed entry goes first.
    Lru,
    /// Least frequently accessed entry goes first; ties fall back to recency.
    Lfu,
    /// Oldest inserted entry goes first.
    Fifo,
    /// Never evicts; the store grows without bound.
    None,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreConfig {
    pub max_size: usize,
    pub policy: EvictionPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ttl_ms: Option<u64>,
    /// Guarded stores reject reentrant writes instead of aliasing the store.
    #[serde(default)]
    pub guarded: bool,
}

impl StoreConfig {
    pub fn new(max_size: usize, policy: EvictionPolicy) -> Self {
        Self {
            max_size,
            policy,
            default_ttl_ms: None,
            guarded: false,
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.default_ttl_ms = Some(ttl_ms);
        self
    }

    pub fn guarded(mut self) -> Self {
        self.guarded = true;
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_ms.map(Duration::from_millis)
    }

    fn is_bounded(&self) -> bool {
        self.policy != EvictionPolicy::None && self.max_size > 0
    }
}

/// `(store, key)` pair an entry depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyKey {
    pub store: String,
    pub key: String,
}

impl DependencyKey {
    pub fn new(store: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for DependencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store, self.key)
    }
}

/// Per-insert options: TTL override and dependencies.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub depends_on: Vec<DependencyKey>,
}

impl SetOptions {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn depends_on(mut self, store: impl Into<String>, key: impl Into<String>) -> Self {
        self.depends_on.push(DependencyKey::new(store, key));
        self
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Duration,
    pub ttl: Option<Duration>,
    pub last_access: Duration,
    pub access_count: u64,
    pub depends_on: Vec<DependencyKey>,
    access_seq: u64,
    inserted_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Duration) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_sub(self.created_at) > ttl)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub gets: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits as f64 / self.gets as f64
        }
    }
}

pub struct CacheStore<V> {
    name: String,
    config: StoreConfig,
    entries: IndexMap<String, CacheEntry<V>>,
    seq: u64,
    stats: CacheStats,
    clock: SharedClock,
}

impl<V> CacheStore<V> {
    pub fn new(name: impl Into<String>, config: StoreConfig, clock: SharedClock) -> Self {
        Self {
            name: name.into(),
            config,
            entries: IndexMap::new(),
            seq: 0,
            stats: CacheStats::default(),
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    /// Looks up `key`, counting a hit or miss and refreshing recency on a hit.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.stats.gets += 1;
        if !self.expire_if_stale(key) {
            self.stats.misses += 1;
            return None;
        }

        let now = self.clock.now();
        self.seq += 1;
        let seq = self.seq;
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.stats.hits += 1;
                entry.access_seq = seq;
                entry.access_count += 1;
                entry.last_access = now;
                Some(&entry.value)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Fresh entries in insertion order, without touching statistics or recency.
    pub fn fresh_entries(&self) -> impl Iterator<Item = (&str, &V)> + '_ {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(move |(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| (key.as_str(), &entry.value))
    }

    /// Presence check that honours TTL but leaves statistics and recency alone.
    pub fn has(&mut self, key: &str) -> bool {
        self.expire_if_stale(key)
    }

    /// Inserts or replaces `key`. Returns the key evicted to make room, if any.
    pub fn set(&mut self, key: impl Into<String>, value: V, options: SetOptions) -> Option<String> {
        let key = key.into();
        let now = self.clock.now();
        self.seq += 1;
        let seq = self.seq;
        let ttl = options.ttl.or_else(|| self.config.default_ttl());

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            entry.created_at = now;
            entry.ttl = ttl;
            entry.last_access = now;
            entry.access_seq = seq;
            entry.depends_on = options.depends_on;
            return None;
        }

        if self.config.is_bounded() && self.entries.len() >= self.config.max_size {
            self.purge_expired();
        }
        let evicted = if self.config.is_bounded() && self.entries.len() >= self.config.max_size {
            self.evict_one()
        } else {
            None
        };

        self.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                ttl,
                last_access: now,
                access_count: 0,
                depends_on: options.depends_on,
                access_seq: seq,
                inserted_seq: seq,
            },
        );
        evicted
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.shift_remove(key)
    }

    /// Removes `key` as an invalidation, counted separately from plain deletes.
    pub fn invalidate(&mut self, key: &str) -> bool {
        let removed = self.entries.shift_remove(key).is_some();
        if removed {
            self.stats.invalidations += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys whose `depends_on` lists `dependency`.
    pub fn dependents_of(&self, dependency: &DependencyKey) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.depends_on.contains(dependency))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Returns true when `key` is present and fresh; drops it if its TTL ran out.
    fn expire_if_stale(&mut self, key: &str) -> bool {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                self.entries.shift_remove(key);
                self.stats.expirations += 1;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Drops every entry whose TTL ran out. Returns how many were dropped.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - self.entries.len();
        self.stats.expirations += purged as u64;
        purged
    }

    fn evict_one(&mut self) -> Option<String> {
        let victim = match self.config.policy {
            EvictionPolicy::Lru => self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.access_seq),
            EvictionPolicy::Lfu => self
                .entries
                .iter()
                .min_by_key(|(_, entry)| (entry.access_count, entry.access_seq)),
            EvictionPolicy::Fifo => self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_seq),
            EvictionPolicy::None => None,
        }
        .map(|(key, _)| key.clone())?;

        self.entries.shift_remove(&victim);
        self.stats.evictions += 1;
        log::debug!("Cache '{}' evicted '{}'", self.name, victim);
        Some(victim)
    }
}

impl<V> fmt::Debug for CacheStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("len", &self.entries.len())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::rc::Rc;

    fn store(policy: EvictionPolicy, max_size: usize) -> (CacheStore<u32>, ManualClock) {
        let clock = ManualClock::new();
        let store = CacheStore::new("test", StoreConfig::new(max_size, policy), Rc::new(clock.clone()));
        (store, clock)
    }

    #[test]
    fn lru_evicts_least_recently_accessed() {
        let (mut store, _) = store(EvictionPolicy::Lru, 3);
        store.set("a", 1, SetOptions::default());
        store.set("b", 2, SetOptions::default());
        store.set("c", 3, SetOptions::default());
        store.get("a");

        assert_eq!(store.set("d", 4, SetOptions::default()), Some("b".to_string()));
        assert!(store.has("a") && store.has("c") && store.has("d"));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn lfu_evicts_least_accessed() {
        let (mut store, _) = store(EvictionPolicy::Lfu, 2);
        store.set("hot", 1, SetOptions::default());
        store.set("cold", 2, SetOptions::default());
        store.get("hot");
        store.get("hot");
        store.get("cold");

        assert_eq!(store.set("new", 3, SetOptions::default()), Some("cold".to_string()));
    }

    #[test]
    fn fifo_ignores_access() {
        let (mut store, _) = store(EvictionPolicy::Fifo, 2);
        store.set("first", 1, SetOptions::default());
        store.set("second", 2, SetOptions::default());
        store.get("first");

        assert_eq!(store.set("third", 3, SetOptions::default()), Some("first".to_string()));
    }

    #[test]
    fn none_policy_never_evicts() {
        let (mut store, _) = store(EvictionPolicy::None, 1);
        for (index, key) in ["a", "b", "c"].into_iter().enumerate() {
            assert_eq!(store.set(key, index as u32, SetOptions::default()), None);
        }
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn overwriting_does_not_evict() {
        let (mut store, _) = store(EvictionPolicy::Lru, 1);
        store.set("a", 1, SetOptions::default());
        assert_eq!(store.set("a", 2, SetOptions::default()), None);
        assert_eq!(store.get("a"), Some(&2));
    }

    #[test]
    fn ttl_entries_expire_lazily() {
        let (mut store, clock) = store(EvictionPolicy::Lru, 4);
        store.set("short", 1, SetOptions::default().ttl(Duration::from_millis(100)));
        store.set("long", 2, SetOptions::default());

        clock.advance_ms(100);
        assert!(store.has("short"));
        clock.advance_ms(1);
        assert!(!store.has("short"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long"), Some(&2));
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn full_store_drops_expired_entries_before_evicting() {
        let (mut store, clock) = store(EvictionPolicy::Lru, 2);
        store.set("stale", 1, SetOptions::default().ttl(Duration::from_millis(50)));
        store.set("live", 2, SetOptions::default());
        store.get("stale");
        clock.advance_ms(51);

        assert_eq!(store.set("new", 3, SetOptions::default()), None);
        assert!(store.has("live") && store.has("new"));
        assert_eq!(store.stats().evictions, 0);
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let (mut store, _) = store(EvictionPolicy::Lru, 4);
        store.set("a", 1, SetOptions::default());
        store.get("a");
        store.get("missing");

        let stats = store.stats();
        assert_eq!((stats.gets, stats.hits, stats.misses), (2, 1, 1));
        assert_eq!(stats.hit_ratio(), 0.5);
    }
}
