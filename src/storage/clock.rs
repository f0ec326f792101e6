//! Time Sources and the Packed Access Field
//!
//! Every object carries a single `u32` access field:
//!
//! ```text
//!  31        24 23                                 0
//! ┌────────────┬────────────────────────────────────┐
//! │ LFU counter│   LRU clock (seconds, mod 2^24)     │
//! └────────────┴────────────────────────────────────┘
//! ```
//!
//! The low 24 bits hold a wall-clock-seconds value that wraps roughly every
//! 194 days; idle times are therefore computed modulo 2^24. The high byte is a
//! saturating, logarithmically incremented access counter.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Largest value of the 24-bit LRU clock.
pub const LRU_CLOCK_MAX: u32 = 0x00FF_FFFF;

/// Bit offset of the LFU counter inside the access field.
pub const LFU_COUNTER_SHIFT: u32 = 24;

/// A source of wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> u64;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to. Used to make expiry and eviction
/// behaviour deterministic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Moves the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Converts epoch milliseconds to the 24-bit LRU clock.
#[inline]
pub fn lru_clock(now_ms: u64) -> u32 {
    ((now_ms / 1000) & LRU_CLOCK_MAX as u64) as u32
}

/// Seconds elapsed between `last_accessed_at` and `now_clock`, wrap-aware.
///
/// Only the clock bits of `last_accessed_at` are considered, so a packed
/// access field may be passed directly.
#[inline]
pub fn idle_time(now_clock: u32, last_accessed_at: u32) -> u32 {
    (now_clock & LRU_CLOCK_MAX).wrapping_sub(last_accessed_at & LRU_CLOCK_MAX) & LRU_CLOCK_MAX
}

/// Extracts the LFU counter from a packed access field.
#[inline]
pub fn lfu_counter(access: u32) -> u8 {
    (access >> LFU_COUNTER_SHIFT) as u8
}

/// Extracts the LRU clock from a packed access field.
#[inline]
pub fn access_clock(access: u32) -> u32 {
    access & LRU_CLOCK_MAX
}

/// Packs a clock value and a counter into one access field.
#[inline]
pub fn pack_access(clock: u32, counter: u8) -> u32 {
    ((counter as u32) << LFU_COUNTER_SHIFT) | (clock & LRU_CLOCK_MAX)
}

/// Probabilistically increments an LFU counter.
///
/// The increment happens with probability `1 / (counter * log_factor + 1)`,
/// so hot keys climb ever more slowly. The counter saturates at 255.
pub fn incr_lfu_counter<R: Rng + ?Sized>(counter: u8, log_factor: u32, rng: &mut R) -> u8 {
    if counter == u8::MAX {
        return counter;
    }
    let p = 1.0 / (counter as f64 * log_factor as f64 + 1.0);
    if rng.gen::<f64>() < p {
        counter + 1
    } else {
        counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_lru_clock_masks_to_24_bits() {
        assert_eq!(lru_clock(0), 0);
        assert_eq!(lru_clock(5_999), 5);
        assert_eq!(lru_clock((LRU_CLOCK_MAX as u64 + 1) * 1000), 0);
        assert_eq!(lru_clock((LRU_CLOCK_MAX as u64 + 3) * 1000), 2);
    }

    #[test]
    fn test_idle_time_handles_wraparound() {
        assert_eq!(idle_time(100, 40), 60);
        assert_eq!(idle_time(3, LRU_CLOCK_MAX - 1), 5);
        assert_eq!(idle_time(7, 7), 0);
        // counter bits do not leak into idle time
        assert_eq!(idle_time(100, pack_access(40, 200)), 60);
    }

    #[test]
    fn test_pack_and_unpack() {
        let access = pack_access(0x0012_3456, 0xAB);
        assert_eq!(lfu_counter(access), 0xAB);
        assert_eq!(access_clock(access), 0x0012_3456);
        assert_eq!(lfu_counter(pack_access(LRU_CLOCK_MAX + 5, 1)), 1);
    }

    #[test]
    fn test_first_increment_is_certain() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(incr_lfu_counter(0, 10, &mut rng), 1);
        assert_eq!(incr_lfu_counter(200, 0, &mut rng), 201);
        assert_eq!(incr_lfu_counter(255, 0, &mut rng), 255);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set_ms(10);
        assert_eq!(clock.now_ms(), 10);
    }

    proptest! {
        #[test]
        fn prop_lfu_counter_is_monotonic(seed in any::<u64>(), factor in 0u32..32, accesses in 1usize..2000) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut counter = 0u8;
            for _ in 0..accesses {
                let next = incr_lfu_counter(counter, factor, &mut rng);
                prop_assert!(next >= counter);
                prop_assert!(next - counter <= 1);
                counter = next;
            }
        }
    }
}
