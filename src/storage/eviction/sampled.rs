//! Approximated LRU / LFU eviction.
//!
//! Instead of tracking a global access order, each round samples a few keys,
//! feeds them to the [`EvictionPool`] and evicts the pool's best candidate.
//! Recency and frequency are read lazily from each object's access field, so
//! reads and writes pay nothing for this policy.

use super::pool::{EvictionPool, PoolOrdering};
use super::{ratio_eviction_count, EvictionStats, EvictionStrategy};
use crate::storage::store::Store;

/// Keys sampled into the pool per round.
pub const POOL_SAMPLE_SIZE: usize = 5;

#[derive(Debug)]
pub struct SampledEviction {
    pool: EvictionPool,
    keys_limit: usize,
    eviction_ratio: f64,
    stats: EvictionStats,
}

impl SampledEviction {
    pub fn new(ordering: PoolOrdering, keys_limit: usize, eviction_ratio: f64) -> Self {
        Self {
            pool: EvictionPool::new(ordering),
            keys_limit,
            eviction_ratio,
            stats: EvictionStats::default(),
        }
    }

    pub fn pool(&self) -> &EvictionPool {
        &self.pool
    }

    /// Samples up to [`POOL_SAMPLE_SIZE`] keys into the pool.
    pub fn populate_eviction_pool(&mut self, store: &Store) {
        let now = store.current_clock();
        let mut rng = rand::thread_rng();
        for (key, obj) in store.get_store().sample(POOL_SAMPLE_SIZE, &mut rng) {
            self.pool.push(key, obj.last_accessed_at(), now);
        }
    }
}

impl EvictionStrategy for SampledEviction {
    fn name(&self) -> &'static str {
        match self.pool.ordering() {
            PoolOrdering::Lru => "allkeys-lru",
            PoolOrdering::Lfu => "allkeys-lfu",
        }
    }

    fn should_evict(&self, store: &Store) -> usize {
        ratio_eviction_count(store, self.keys_limit, self.eviction_ratio)
    }

    fn evict_victims(&mut self, store: &mut Store, to_evict: usize) {
        let mut evicted = 0;
        while evicted < to_evict {
            self.populate_eviction_pool(store);
            // Candidates deleted since they were pooled simply fail to evict.
            let Some(item) = self.pool.pop() else {
                break;
            };
            if store.evict_key(&item.key) {
                evicted += 1;
            }
        }
        self.stats.record(evicted, store.now_ms());
    }

    fn stats(&self) -> EvictionStats {
        self.stats
    }
}
