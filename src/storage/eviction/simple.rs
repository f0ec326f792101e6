//! Baseline strategies that ignore access history.

use super::{ratio_eviction_count, EvictionStats, EvictionStrategy};
use crate::storage::store::Store;

/// Evicts one key per insertion over the limit, in key table order.
///
/// No quality guarantee; useful as a baseline and in tests.
#[derive(Debug)]
pub struct SimpleFirst {
    keys_limit: usize,
    stats: EvictionStats,
}

impl SimpleFirst {
    pub fn new(keys_limit: usize) -> Self {
        Self {
            keys_limit,
            stats: EvictionStats::default(),
        }
    }
}

impl EvictionStrategy for SimpleFirst {
    fn name(&self) -> &'static str {
        "simple-first"
    }

    fn should_evict(&self, store: &Store) -> usize {
        usize::from(store.key_count() >= self.keys_limit)
    }

    fn evict_victims(&mut self, store: &mut Store, to_evict: usize) {
        if to_evict == 0 {
            return;
        }
        let mut victims = Vec::with_capacity(to_evict);
        store.get_store().all(|key, _| {
            victims.push(key.to_string());
            victims.len() < to_evict
        });

        let evicted = victims.iter().filter(|key| store.evict_key(key)).count();
        self.stats.record(evicted, store.now_ms());
    }

    fn stats(&self) -> EvictionStats {
        self.stats
    }
}

/// Evicts `eviction_ratio × keys_limit` keys in hash order, which is
/// randomized per table.
#[derive(Debug)]
pub struct AllKeysRandom {
    keys_limit: usize,
    eviction_ratio: f64,
    stats: EvictionStats,
}

impl AllKeysRandom {
    pub fn new(keys_limit: usize, eviction_ratio: f64) -> Self {
        Self {
            keys_limit,
            eviction_ratio,
            stats: EvictionStats::default(),
        }
    }
}

impl EvictionStrategy for AllKeysRandom {
    fn name(&self) -> &'static str {
        "allkeys-random"
    }

    fn should_evict(&self, store: &Store) -> usize {
        ratio_eviction_count(store, self.keys_limit, self.eviction_ratio)
    }

    fn evict_victims(&mut self, store: &mut Store, to_evict: usize) {
        let victims: Vec<String> = store
            .get_store()
            .keys_unordered()
            .take(to_evict)
            .map(str::to_string)
            .collect();

        let evicted = victims.iter().filter(|key| store.evict_key(key)).count();
        self.stats.record(evicted, store.now_ms());
    }

    fn stats(&self) -> EvictionStats {
        self.stats
    }
}
