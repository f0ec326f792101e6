//! Exact batch LRU eviction.
//!
//! One full scan per eviction event keeps the `n` least recently used keys in
//! a bounded max-heap whose top is the most recent of the current candidates:
//!
//! ```text
//!   scan ──▶ heap not full?         push
//!            older than heap top?   replace top
//!            otherwise              skip
//! ```
//!
//! After the scan the heap holds exactly the `n` oldest keys. This trades the
//! sampling pool's constant cost for exact victims.

use super::{EvictionStats, EvictionStrategy};
use crate::storage::clock::idle_time;
use crate::storage::store::Store;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Candidate {
    idle: u32,
    key: String,
}

// Ordered by idle time alone, so the heap's top is the least idle (most
// recent) candidate.
impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.idle == other.idle
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other.idle.cmp(&self.idle)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
pub struct PrimitiveEvictionStrategy {
    max_keys: usize,
    eviction_ratio: f64,
    stats: EvictionStats,
}

impl PrimitiveEvictionStrategy {
    pub fn new(max_keys: usize, eviction_ratio: f64) -> Self {
        Self {
            max_keys,
            eviction_ratio,
            stats: EvictionStats::default(),
        }
    }

    /// Number of keys the store is trimmed down to by one pass.
    pub fn target_keys(&self) -> usize {
        (self.max_keys as f64 * (1.0 - self.eviction_ratio)).ceil() as usize
    }
}

impl EvictionStrategy for PrimitiveEvictionStrategy {
    fn name(&self) -> &'static str {
        "batch_keys_lru"
    }

    fn should_evict(&self, store: &Store) -> usize {
        let count = store.key_count();
        if count < self.max_keys {
            return 0;
        }
        count.saturating_sub(self.target_keys()).max(1)
    }

    fn evict_victims(&mut self, store: &mut Store, to_evict: usize) {
        if to_evict == 0 {
            return;
        }

        let now = store.current_clock();
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(to_evict);
        store.get_store().all(|key, obj| {
            let idle = idle_time(now, obj.last_accessed_at());
            if heap.len() < to_evict {
                heap.push(Candidate {
                    idle,
                    key: key.to_string(),
                });
            } else if let Some(mut top) = heap.peek_mut() {
                if idle > top.idle {
                    *top = Candidate {
                        idle,
                        key: key.to_string(),
                    };
                }
            }
            true
        });

        let evicted = heap
            .into_iter()
            .filter(|candidate| store.evict_key(&candidate.key))
            .count();
        self.stats.record(evicted, store.now_ms());
    }

    fn stats(&self) -> EvictionStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::clock::ManualClock;
    use crate::storage::{Object, ObjectType, PutOptions, StoreConfig};
    use std::sync::Arc;

    const T0: u64 = 1_700_000_000_000;

    fn store(max_keys: usize, ratio: f64) -> (Store, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let config = StoreConfig {
            keys_limit: max_keys,
            eviction_ratio: ratio,
            ..Default::default()
        };
        let strategy = Box::new(PrimitiveEvictionStrategy::new(max_keys, ratio));
        (Store::with_clock(config, strategy, clock.clone()), clock)
    }

    fn put(store: &mut Store, key: &str) {
        store.put(key, Object::new("v", ObjectType::String), PutOptions::default());
    }

    #[test]
    fn test_should_evict_targets() {
        let (mut store, _) = store(10, 0.2);
        let strategy = PrimitiveEvictionStrategy::new(10, 0.2);
        assert_eq!(strategy.target_keys(), 8);

        for i in 0..9 {
            put(&mut store, &format!("key{}", i));
        }
        assert_eq!(strategy.should_evict(&store), 0);
        put(&mut store, "key9");
        assert_eq!(strategy.should_evict(&store), 2);

        // a ratio of zero still frees one slot
        assert_eq!(PrimitiveEvictionStrategy::new(10, 0.0).should_evict(&store), 1);
    }

    #[test]
    fn test_evicts_exactly_the_oldest() {
        let (mut store, clock) = store(10, 0.2);
        for i in 0..10 {
            put(&mut store, &format!("key{}", i));
            clock.advance(1_000);
        }
        assert_eq!(store.key_count(), 10);

        put(&mut store, "key10");
        assert_eq!(store.key_count(), 9);
        assert!(store.get_no_touch("key0").is_none());
        assert!(store.get_no_touch("key1").is_none());
        for i in 2..=10 {
            assert!(store.get_no_touch(&format!("key{}", i)).is_some());
        }

        let stats = store.eviction_stats().unwrap();
        assert_eq!(stats.total_evictions, 1);
        assert_eq!(stats.last_eviction_count, 2);
    }

    #[test]
    fn test_recent_reads_protect_keys() {
        let (mut store, clock) = store(5, 0.4);
        for i in 0..5 {
            put(&mut store, &format!("key{}", i));
            clock.advance(1_000);
        }
        // key0 and key1 are the oldest writes but were read last
        store.get("key0");
        store.get("key1");
        clock.advance(1_000);

        put(&mut store, "new");
        assert!(store.get_no_touch("key0").is_some());
        assert!(store.get_no_touch("key1").is_some());
        assert!(store.get_no_touch("key2").is_none());
        assert!(store.get_no_touch("key3").is_none());
        assert_eq!(store.key_count(), 4);
    }

    #[test]
    fn test_identical_access_times() {
        let (mut store, _) = store(10, 0.5);
        for i in 0..11 {
            put(&mut store, &format!("key{}", i));
        }
        // 10 keys at the limit trimmed to 5, then the new key goes in
        assert_eq!(store.key_count(), 6);
        assert!(store.get_no_touch("key10").is_some());
    }

    #[test]
    fn test_candidate_equality_follows_ordering() {
        let a = Candidate {
            idle: 7,
            key: "a".into(),
        };
        let b = Candidate {
            idle: 7,
            key: "b".into(),
        };
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a, b);

        let older = Candidate {
            idle: 9,
            key: "a".into(),
        };
        assert_ne!(a, older);
        assert_eq!(older.cmp(&a), Ordering::Less);
    }
}
