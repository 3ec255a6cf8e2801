//! Key-value store with per-entry expiry and an optional entry bound.
//!
//! Expiry is lazy: reads check the entry's age and drop it when stale. A bounded cache
//! evicts by insertion time, oldest first, through an ordered index so eviction does not
//! scan the whole map.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    stored_at: Instant,
    seq: u64,
}

/// Time-bounded cache
#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    max_entries: Option<usize>,
    entries: HashMap<K, Entry<V>>,
    /// (stored_at, seq) -> key; seq breaks ties between identical instants
    order: BTreeMap<(Instant, u64), K>,
    next_seq: u64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Unbounded cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            max_entries: None,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Cache holding at most `max_entries` entries
    pub fn bounded(ttl: Duration, max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries.max(1)),
            ..Self::new(ttl)
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.stored_at) > self.ttl
    }

    /// Insert or replace `key`, evicting the oldest entries first when full
    pub fn set(&mut self, key: K, value: V) {
        if let Some(previous) = self.entries.remove(&key) {
            self.order.remove(&(previous.stored_at, previous.seq));
        } else if let Some(max) = self.max_entries {
            while self.entries.len() >= max {
                if !self.evict_oldest() {
                    break;
                }
            }
        }

        let stored_at = Instant::now();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((stored_at, seq), key.clone());
        self.entries.insert(
            key,
            Entry {
                value,
                stored_at,
                seq,
            },
        );
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, key)) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Live value for `key`; a stale entry is removed and reported as a miss
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return None,
            Some(entry) if !self.is_expired(entry, now) => return Some(entry.value.clone()),
            Some(_) => {}
        }
        self.delete(key);
        None
    }

    pub fn has(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Remove `key`, returning whether an entry existed
    pub fn delete(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&(entry.stored_at, entry.seq));
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Keep only entries matching `keep`; returns how many were removed
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let before = self.entries.len();
        let order = &mut self.order;
        self.entries.retain(|key, entry| {
            let retained = keep(key, &entry.value);
            if !retained {
                order.remove(&(entry.stored_at, entry.seq));
            }
            retained
        });
        before - self.entries.len()
    }

    /// Drop every stale entry; returns how many were removed
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut removed = 0;
        // Entries are ordered by age, so stop at the first live one.
        while let Some((&(stored_at, seq), _)) = self.order.first_key_value() {
            if now.saturating_duration_since(stored_at) <= ttl {
                break;
            }
            if let Some(key) = self.order.remove(&(stored_at, seq)) {
                self.entries.remove(&key);
                removed += 1;
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_live_until_ttl() {
        let mut cache = TtlCache::new(Duration::from_millis(100));
        cache.set("a", 1);

        tokio::time::advance(Duration::from_millis(99)).await;
        assert_eq!(cache.get(&"a"), Some(1));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get(&"a"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_read_removes_entry() {
        let mut cache = TtlCache::new(Duration::from_millis(100));
        cache.set("a", 1);

        tokio::time::advance(Duration::from_millis(101)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.len(), 0);
        assert!(!cache.has(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_removes_exactly_oldest() {
        let mut cache = TtlCache::bounded(Duration::from_secs(10), 3);
        cache.set("a", 1);
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.set("b", 2);
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.set("c", 3);
        tokio::time::advance(Duration::from_millis(1)).await;

        cache.set("d", 4);
        assert_eq!(cache.len(), 3);
        assert!(!cache.has(&"a"));
        assert!(cache.has(&"b"));
        assert!(cache.has(&"c"));
        assert!(cache.has(&"d"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_tie_breaks_on_insertion_order() {
        let mut cache = TtlCache::bounded(Duration::from_secs(10), 2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        assert!(!cache.has(&"a"));
        assert!(cache.has(&"b"));
        assert!(cache.has(&"c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_does_not_evict() {
        let mut cache = TtlCache::bounded(Duration::from_secs(10), 2);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));

        // "b" is now the oldest entry
        cache.set("c", 3);
        assert!(!cache.has(&"b"));
        assert!(cache.has(&"a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_refreshes_age() {
        let mut cache = TtlCache::new(Duration::from_millis(100));
        cache.set("a", 1);
        tokio::time::advance(Duration::from_millis(80)).await;
        cache.set("a", 2);
        tokio::time::advance(Duration::from_millis(80)).await;
        assert_eq!(cache.get(&"a"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_and_retain() {
        let mut cache = TtlCache::new(Duration::from_millis(100));
        cache.set(("tab-1", "x"), 1);
        cache.set(("tab-2", "x"), 2);
        tokio::time::advance(Duration::from_millis(60)).await;
        cache.set(("tab-1", "y"), 3);
        tokio::time::advance(Duration::from_millis(60)).await;

        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);

        cache.set(("tab-2", "z"), 4);
        assert_eq!(cache.retain(|(tab, _), _| *tab != "tab-1"), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.has(&("tab-2", "z")));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut cache: TtlCache<&str, i32> = TtlCache::new(Duration::from_secs(1));
        assert!(!cache.delete(&"nothing"));
        cache.clear();
        assert!(cache.is_empty());
    }
}
