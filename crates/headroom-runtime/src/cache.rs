//! Bounded result cache with least-recently-used eviction

use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    last_used: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
pub struct LruCache<V> {
    entries: HashMap<String, CacheEntry<V>>,
    capacity: usize,
    clock: u64,
    hits: u64,
    misses: u64,
}

impl<V: Clone> LruCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            hits: 0,
            misses: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up `key`, marking it most recently used on a hit
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = now;
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert `value`, evicting the least recently used entry when full
    pub fn put(&mut self, key: String, value: V) {
        let now = self.tick();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_lru(1);
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                last_used: now,
            },
        );
    }

    /// Evict up to `count` least recently used entries, returning how many went
    pub fn evict_lru(&mut self, count: usize) -> usize {
        let victims: Vec<String> = self.keys().into_iter().take(count).collect();
        for key in &victims {
            self.entries.remove(key);
        }
        victims.len()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> Vec<String> {
        let mut keyed: Vec<(&String, u64)> = self
            .entries
            .iter()
            .map(|(k, e)| (k, e.last_used))
            .collect();
        keyed.sort_by_key(|&(_, used)| used);
        keyed.into_iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
        }
    }
}
