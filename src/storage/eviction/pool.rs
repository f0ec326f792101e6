//! Eviction Pool
//!
//! A small sorted buffer of eviction candidates shared across sampling rounds
//! of one strategy instance. Each round pushes a handful of sampled keys; the
//! pool keeps only the best candidates seen so far, so repeated small samples
//! converge on a good approximation of true LRU/LFU order.
//!
//! ```text
//!   best ─────────────────────────────────────────────▶ worst
//!   ┌──────┬──────┬──────┬──────┬─────┬──────┐
//!   │ k:12 │ k:3  │ k:40 │ k:7  │ ... │ k:91 │   len <= 16
//!   └──────┴──────┴──────┴──────┴─────┴──────┘
//!     ▲ pop()                               ▲ displaced when a better
//!                                             candidate arrives while full
//! ```

use crate::storage::clock::{idle_time, lfu_counter};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Maximum number of candidates held by a pool.
pub const EVICTION_POOL_SIZE: usize = 16;

/// How candidates are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOrdering {
    /// Longest idle first
    Lru,
    /// Lowest access counter first, longest idle breaking ties
    Lfu,
}

/// One candidate key and the access field it had when sampled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolItem {
    pub key: String,
    pub last_accessed_at: u32,
}

impl PoolItem {
    /// Seconds the key has been idle as of `now_clock`.
    pub fn idle(&self, now_clock: u32) -> u32 {
        idle_time(now_clock, self.last_accessed_at)
    }
}

#[derive(Debug)]
pub struct EvictionPool {
    ordering: PoolOrdering,
    /// Sorted best candidate first, as of `clock`
    items: Vec<PoolItem>,
    keys: HashSet<String>,
    /// LRU clock every idle time in the pool is measured against
    clock: u32,
}

impl EvictionPool {
    pub fn new(ordering: PoolOrdering) -> Self {
        Self {
            ordering,
            items: Vec::with_capacity(EVICTION_POOL_SIZE),
            keys: HashSet::with_capacity(EVICTION_POOL_SIZE),
            clock: 0,
        }
    }

    pub fn ordering(&self) -> PoolOrdering {
        self.ordering
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// `Less` means `a` should be evicted before `b`.
    fn compare(&self, a: &PoolItem, b: &PoolItem) -> Ordering {
        compare_at(self.ordering, self.clock, a, b)
    }

    /// Re-ranks the pool against `now_clock`.
    ///
    /// Idle times are relative to the clock, so candidates pooled during an
    /// earlier pass only stay comparable with new ones if everything is
    /// measured against the same instant. The 24-bit clock wraps, which can
    /// reorder existing candidates.
    fn advance_clock(&mut self, now_clock: u32) {
        if now_clock == self.clock {
            return;
        }
        self.clock = now_clock;
        let (ordering, clock) = (self.ordering, self.clock);
        self.items.sort_by(|a, b| compare_at(ordering, clock, a, b));
    }

    /// Offers a sampled key to the pool.
    ///
    /// Keys already present are ignored. Equal candidates keep their arrival
    /// order. When the pool is full the new key only gets in by displacing a
    /// strictly worse candidate.
    pub fn push(&mut self, key: &str, last_accessed_at: u32, now_clock: u32) {
        if self.keys.contains(key) {
            return;
        }
        self.advance_clock(now_clock);

        let item = PoolItem {
            key: key.to_string(),
            last_accessed_at,
        };

        if self.items.len() >= EVICTION_POOL_SIZE {
            let Some(worst) = self.items.last() else {
                return;
            };
            if self.compare(&item, worst) != Ordering::Less {
                return;
            }
            if let Some(displaced) = self.items.pop() {
                self.keys.remove(&displaced.key);
            }
        }

        let pos = self
            .items
            .partition_point(|existing| self.compare(existing, &item) != Ordering::Greater);
        self.keys.insert(item.key.clone());
        self.items.insert(pos, item);
    }

    /// Removes and returns the best eviction candidate.
    pub fn pop(&mut self) -> Option<PoolItem> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items.remove(0);
        self.keys.remove(&item.key);
        Some(item)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.keys.clear();
    }
}

fn compare_at(ordering: PoolOrdering, now_clock: u32, a: &PoolItem, b: &PoolItem) -> Ordering {
    let by_idle = || b.idle(now_clock).cmp(&a.idle(now_clock));
    match ordering {
        PoolOrdering::Lru => by_idle(),
        PoolOrdering::Lfu => lfu_counter(a.last_accessed_at)
            .cmp(&lfu_counter(b.last_accessed_at))
            .then_with(by_idle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::clock::pack_access;
    use proptest::prelude::*;

    const NOW: u32 = 10_000;

    #[test]
    fn test_lru_pops_longest_idle_first() {
        let mut pool = EvictionPool::new(PoolOrdering::Lru);
        pool.push("recent", pack_access(NOW - 1, 0), NOW);
        pool.push("old", pack_access(NOW - 100, 0), NOW);
        pool.push("middle", pack_access(NOW - 10, 0), NOW);

        let order: Vec<String> = std::iter::from_fn(|| pool.pop()).map(|i| i.key).collect();
        assert_eq!(order, vec!["old", "middle", "recent"]);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_lfu_orders_by_counter_then_idle() {
        let mut pool = EvictionPool::new(PoolOrdering::Lfu);
        pool.push("hot", pack_access(NOW - 500, 50), NOW);
        pool.push("cold-recent", pack_access(NOW - 1, 2), NOW);
        pool.push("cold-old", pack_access(NOW - 300, 2), NOW);

        let order: Vec<String> = std::iter::from_fn(|| pool.pop()).map(|i| i.key).collect();
        assert_eq!(order, vec!["cold-old", "cold-recent", "hot"]);
    }

    #[test]
    fn test_idle_time_wraps() {
        let mut pool = EvictionPool::new(PoolOrdering::Lru);
        // accessed just before the 24-bit clock wrapped
        pool.push("before-wrap", pack_access(0x00FF_FFF0, 0), 5);
        pool.push("after-wrap", pack_access(2, 0), 5);
        assert_eq!(pool.pop().map(|i| i.key).as_deref(), Some("before-wrap"));
    }

    #[test]
    fn test_candidates_pooled_at_different_clocks() {
        let mut pool = EvictionPool::new(PoolOrdering::Lru);
        // idle 50 when pooled during an early pass
        pool.push("older", pack_access(50, 0), 100);
        // idle 940 when pooled much later, yet accessed after "older"
        pool.push("newer", pack_access(60, 0), 1_000);

        assert_eq!(pool.pop().map(|i| i.key).as_deref(), Some("older"));
        assert_eq!(pool.pop().map(|i| i.key).as_deref(), Some("newer"));
    }

    #[test]
    fn test_full_pool_compares_against_current_clock() {
        let mut pool = EvictionPool::new(PoolOrdering::Lru);
        for i in 0..EVICTION_POOL_SIZE as u32 {
            pool.push(&format!("key{}", i), pack_access(1_000 + i, 0), 1_100);
        }

        // key15 is the weakest; "late" was accessed before it, so it must
        // displace key15 even though it is sampled at a later clock
        pool.push("late", pack_access(1_010, 0), 5_000);
        assert!(pool.contains("late"));
        assert!(!pool.contains("key15"));

        let order: Vec<String> = std::iter::from_fn(|| pool.pop()).map(|i| i.key).collect();
        assert_eq!(order.iter().position(|k| k == "late"), Some(11));
        assert_eq!(order[0], "key0");
    }

    #[test]
    fn test_full_pool_keeps_best_candidates() {
        let mut pool = EvictionPool::new(PoolOrdering::Lru);
        for i in 0..EVICTION_POOL_SIZE as u32 {
            pool.push(&format!("key{}", i), pack_access(NOW - 100 - i, 0), NOW);
        }
        assert_eq!(pool.len(), EVICTION_POOL_SIZE);

        // worse than everything in the pool: rejected
        pool.push("fresh", pack_access(NOW, 0), NOW);
        assert!(!pool.contains("fresh"));

        // better than the weakest: displaces key0
        pool.push("ancient", pack_access(NOW - 9_000, 0), NOW);
        assert_eq!(pool.len(), EVICTION_POOL_SIZE);
        assert!(pool.contains("ancient"));
        assert!(!pool.contains("key0"));
        assert_eq!(pool.pop().map(|i| i.key).as_deref(), Some("ancient"));
    }

    #[test]
    fn test_duplicates_ignored() {
        let mut pool = EvictionPool::new(PoolOrdering::Lru);
        pool.push("k", pack_access(NOW - 5, 0), NOW);
        pool.push("k", pack_access(NOW - 50, 0), NOW);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.pop().map(|i| i.idle(NOW)), Some(5));
        assert!(!pool.contains("k"));
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let mut pool = EvictionPool::new(PoolOrdering::Lru);
        for key in ["a", "b", "c", "d"] {
            pool.push(key, pack_access(NOW - 7, 0), NOW);
        }
        let order: Vec<String> = std::iter::from_fn(|| pool.pop()).map(|i| i.key).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    proptest! {
        #[test]
        fn prop_pool_is_bounded_and_unique(
            lfu in any::<bool>(),
            pushes in prop::collection::vec((0u8..40, 0u32..5_000, any::<u8>()), 0..300),
        ) {
            let ordering = if lfu { PoolOrdering::Lfu } else { PoolOrdering::Lru };
            let mut pool = EvictionPool::new(ordering);
            for (key, age, counter) in pushes {
                pool.push(&format!("k{}", key), pack_access(NOW - age, counter), NOW);
                prop_assert!(pool.len() <= EVICTION_POOL_SIZE);
                prop_assert_eq!(pool.keys.len(), pool.items.len());
            }

            let mut seen = HashSet::new();
            let mut previous: Option<PoolItem> = None;
            while let Some(item) = pool.pop() {
                prop_assert!(seen.insert(item.key.clone()));
                if let Some(prev) = &previous {
                    prop_assert_ne!(pool.compare(prev, &item), Ordering::Greater);
                }
                previous = Some(item);
            }
        }
    }
}
