//! Eviction Strategies
//!
//! A store consults its [`EvictionStrategy`] synchronously from `put` when a
//! new key would push it past its key limit. Eviction is a precondition check
//! on insertion, never a background process.
//!
//! ```text
//!   Store::put(new key)
//!        │
//!        ├── should_evict(&store) ──▶ 0 ──▶ insert
//!        │
//!        └── n > 0 ──▶ evict_victims(&mut store, n) ──▶ insert
//! ```
//!
//! ## Strategies
//!
//! | Policy           | Type                          | Cost per pass        |
//! |------------------|-------------------------------|----------------------|
//! | `simple-first`   | [`SimpleFirst`]               | O(n evicted)         |
//! | `allkeys-random` | [`AllKeysRandom`]             | O(n evicted)         |
//! | `allkeys-lru`    | [`SampledEviction`] (LRU)     | O(n evicted × 5)     |
//! | `allkeys-lfu`    | [`SampledEviction`] (LFU)     | O(n evicted × 5)     |
//! | `batch_keys_lru` | [`PrimitiveEvictionStrategy`] | O(keys × log n)      |
//!
//! Each shard owns its own strategy instance, so pool bookkeeping never
//! crosses shards. If a pass cannot free enough keys the store is allowed to
//! exceed its soft limit instead of failing the insertion.

mod batch;
mod pool;
mod sampled;
mod simple;

pub use batch::PrimitiveEvictionStrategy;
pub use pool::{EvictionPool, PoolItem, PoolOrdering, EVICTION_POOL_SIZE};
pub use sampled::{SampledEviction, POOL_SAMPLE_SIZE};
pub use simple::{AllKeysRandom, SimpleFirst};

use super::object::Object;
use super::store::{Store, StoreConfig};
use crate::config::EvictionPolicy;
use std::fmt;

/// The kind of access reported to [`EvictionStrategy::on_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Get,
    Set,
    Del,
}

/// Counters shared by every strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionStats {
    /// Number of eviction passes run
    pub total_evictions: u64,
    /// Number of keys removed across all passes
    pub total_keys_evicted: u64,
    /// Keys removed by the most recent pass
    pub last_eviction_count: u64,
    /// Epoch milliseconds of the most recent pass
    pub last_eviction_time_ms: u64,
}

impl EvictionStats {
    pub(crate) fn record(&mut self, evicted: usize, now_ms: u64) {
        self.total_evictions += 1;
        self.total_keys_evicted += evicted as u64;
        self.last_eviction_count = evicted as u64;
        self.last_eviction_time_ms = now_ms;
    }
}

/// A pluggable eviction policy.
pub trait EvictionStrategy: Send + Sync + fmt::Debug {
    /// Name used in logs and configuration.
    fn name(&self) -> &'static str;

    /// How many keys must be freed before the next new key is inserted.
    /// Zero means no eviction is needed.
    fn should_evict(&self, store: &Store) -> usize;

    /// Frees up to `to_evict` keys from `store`.
    fn evict_victims(&mut self, store: &mut Store, to_evict: usize);

    /// Per-access hook. The shipped strategies keep their bookkeeping in the
    /// objects' access fields, so the default does nothing.
    fn on_access(&mut self, _key: &str, _obj: &Object, _access: AccessType) {}

    fn stats(&self) -> EvictionStats;
}

/// Builds the strategy for `policy` sized by `config`.
pub fn new_strategy(policy: EvictionPolicy, config: &StoreConfig) -> Box<dyn EvictionStrategy> {
    match policy {
        EvictionPolicy::SimpleFirst => Box::new(SimpleFirst::new(config.keys_limit)),
        EvictionPolicy::AllKeysRandom => Box::new(AllKeysRandom::new(
            config.keys_limit,
            config.eviction_ratio,
        )),
        EvictionPolicy::AllKeysLru => Box::new(SampledEviction::new(
            PoolOrdering::Lru,
            config.keys_limit,
            config.eviction_ratio,
        )),
        EvictionPolicy::AllKeysLfu => Box::new(SampledEviction::new(
            PoolOrdering::Lfu,
            config.keys_limit,
            config.eviction_ratio,
        )),
        EvictionPolicy::BatchKeysLru => Box::new(PrimitiveEvictionStrategy::new(
            config.keys_limit,
            config.eviction_ratio,
        )),
    }
}

/// Keys to free per pass for the ratio-driven strategies: `ratio × limit`,
/// at least one, and only once the limit has been reached.
fn ratio_eviction_count(store: &Store, keys_limit: usize, eviction_ratio: f64) -> usize {
    if store.key_count() < keys_limit {
        return 0;
    }
    ((keys_limit as f64 * eviction_ratio) as usize).max(1)
}
