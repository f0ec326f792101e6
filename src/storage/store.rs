//! The Per-Shard Store
//!
//! A [`Store`] owns one shard's keyspace: the key table, the expiry table and
//! the live key counter. It is single-writer by construction; the owning shard
//! task is the only code that mutates it in steady state.
//!
//! ```text
//!   ┌──────────────────────── Store ────────────────────────┐
//!   │  table:   "user:1" ──▶ Object { id: 7, .. }            │
//!   │           "user:2" ──▶ Object { id: 9, .. }            │
//!   │                                                        │
//!   │  expires: ObjectId(7) ──▶ 1_700_000_060_000 (epoch ms) │
//!   │                                                        │
//!   │  num_keys: 2          strategy: Box<dyn Eviction..>    │
//!   └────────────────────────────────────────────────────────┘
//! ```
//!
//! Expired keys are removed lazily by every read path and actively by the
//! shard's cron tick (see [`expiry`](super::expiry)). Capacity is enforced by
//! consulting the eviction strategy before a new key is inserted.

use super::clock::{lru_clock, Clock, SystemClock};
use super::eviction::{AccessType, EvictionStats, EvictionStrategy};
use super::expiry::{has_expired, ExpiryTable};
use super::glob::GlobPattern;
use super::object::{Object, ObjectId, ObjectType, Value};
use super::table::KeyTable;
use crate::error::StoreError;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Capacity and counter tuning for one store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreConfig {
    /// Soft limit on the number of keys
    pub keys_limit: usize,
    /// Fraction of `keys_limit` freed by one eviction pass
    pub eviction_ratio: f64,
    /// Controls how quickly LFU counters saturate
    pub lfu_log_factor: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            keys_limit: 200_000_000,
            eviction_ratio: 0.9,
            lfu_log_factor: 10,
        }
    }
}

/// Options for [`Store::put`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Carry the TTL of the replaced object over to the new one
    pub keep_ttl: bool,
}

impl PutOptions {
    /// Options that keep an existing TTL across an overwrite.
    pub fn keep_ttl() -> Self {
        Self { keep_ttl: true }
    }
}

/// Operation counters of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of keys currently stored
    pub keys: u64,
    /// Total GET-style reads
    pub gets: u64,
    /// Reads that found a live key
    pub hits: u64,
    /// Reads that found nothing or an expired key
    pub misses: u64,
    /// Total PUT operations
    pub sets: u64,
    /// Keys removed by explicit deletes
    pub dels: u64,
    /// Keys removed because their TTL passed
    pub expired: u64,
    /// Keys removed by the eviction strategy
    pub evicted: u64,
}

#[derive(Debug, Clone, Copy)]
enum RemovalCause {
    Deleted,
    Expired,
    Evicted,
}

/// One shard's keyspace.
///
/// # Example
///
/// ```
/// use shardkv::config::EvictionPolicy;
/// use shardkv::storage::{new_strategy, Object, ObjectType, PutOptions, Store, StoreConfig};
///
/// let config = StoreConfig::default();
/// let mut store = Store::new(config, new_strategy(EvictionPolicy::AllKeysLru, &config));
///
/// store.put("name", Object::new("Ariz", ObjectType::String), PutOptions::default());
/// let value = store.get("name").and_then(|obj| obj.value().as_bytes().cloned());
/// assert_eq!(value.as_deref(), Some(&b"Ariz"[..]));
/// ```
pub struct Store {
    table: KeyTable,
    expires: ExpiryTable,
    num_keys: usize,
    config: StoreConfig,
    /// Taken out while a pass runs so the strategy can borrow the store mutably
    strategy: Option<Box<dyn EvictionStrategy>>,
    clock: Arc<dyn Clock>,
    stats: StoreStats,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("num_keys", &self.num_keys)
            .field("expires", &self.expires.len())
            .field("config", &self.config)
            .field("strategy", &self.strategy.as_ref().map(|s| s.name()))
            .finish()
    }
}

impl Store {
    /// Creates an empty store driven by the system clock.
    pub fn new(config: StoreConfig, strategy: Box<dyn EvictionStrategy>) -> Self {
        Self::with_clock(config, strategy, Arc::new(SystemClock))
    }

    /// Creates an empty store driven by `clock`.
    pub fn with_clock(
        config: StoreConfig,
        strategy: Box<dyn EvictionStrategy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            table: KeyTable::new(),
            expires: ExpiryTable::new(),
            num_keys: 0,
            config,
            strategy: Some(strategy),
            clock,
            stats: StoreStats::default(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current time in epoch milliseconds.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Current 24-bit LRU clock.
    #[inline]
    pub fn current_clock(&self) -> u32 {
        lru_clock(self.clock.now_ms())
    }

    /// Builds an object and, if `expiry_ms` is given, registers a TTL for it
    /// relative to now.
    ///
    /// The TTL entry exists from this point on even if the object is never
    /// stored; it is dropped once the object is replaced or deleted.
    pub fn new_obj(
        &mut self,
        value: impl Into<Value>,
        expiry_ms: Option<i64>,
        object_type: ObjectType,
    ) -> Object {
        let obj = Object::new(value, object_type);
        if let Some(ms) = expiry_ms {
            self.set_expiry(obj.id(), ms);
        }
        obj
    }

    /// Inserts or replaces `key`.
    ///
    /// A new key first gives the eviction strategy a chance to free capacity.
    /// Replacing a key drops the old object's TTL unless `opts.keep_ttl` is set,
    /// in which case the TTL moves to the new object.
    pub fn put(&mut self, key: impl Into<String>, mut obj: Object, opts: PutOptions) {
        obj.touch(self.current_clock(), self.config.lfu_log_factor);
        self.put_helper(key.into(), obj, opts);
    }

    /// Inserts every pair with default options.
    pub fn put_all<I, K>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (K, Object)>,
        K: Into<String>,
    {
        for (key, obj) in entries {
            self.put(key, obj, PutOptions::default());
        }
    }

    fn put_helper(&mut self, key: String, obj: Object, opts: PutOptions) {
        self.stats.sets += 1;

        match self.table.get(&key).map(Object::id) {
            Some(old_id) => {
                if opts.keep_ttl {
                    if let Some(at) = self.expires.get(old_id) {
                        self.expires.set(obj.id(), at);
                    }
                }
                self.expires.remove(old_id);
            }
            None => {
                self.evict_if_needed();
                self.num_keys += 1;
            }
        }

        if let Some(strategy) = self.strategy.as_mut() {
            strategy.on_access(&key, &obj, AccessType::Set);
        }
        self.table.insert(key, obj);
    }

    fn evict_if_needed(&mut self) {
        let Some(mut strategy) = self.strategy.take() else {
            return;
        };

        let to_evict = strategy.should_evict(self);
        if to_evict > 0 {
            let before = self.num_keys;
            strategy.evict_victims(self, to_evict);
            debug!(
                strategy = strategy.name(),
                requested = to_evict,
                evicted = before.saturating_sub(self.num_keys),
                keys_remaining = self.num_keys,
                "eviction pass"
            );
        }

        self.strategy = Some(strategy);
    }

    /// Returns the live object under `key` and records the access.
    ///
    /// An expired key is deleted on the spot and reported as missing.
    pub fn get(&mut self, key: &str) -> Option<&Object> {
        self.get_helper(key, true)
    }

    /// Like [`get`](Self::get) but leaves the access field untouched, so the
    /// lookup does not influence eviction.
    pub fn get_no_touch(&mut self, key: &str) -> Option<&Object> {
        self.get_helper(key, false)
    }

    fn get_helper(&mut self, key: &str, touch: bool) -> Option<&Object> {
        self.stats.gets += 1;
        if !self.access(key, touch) {
            self.stats.misses += 1;
            return None;
        }
        self.stats.hits += 1;
        self.table.get(key)
    }

    /// Lazy expiration plus optional touch. Returns whether `key` is live.
    fn access(&mut self, key: &str, touch: bool) -> bool {
        let Some(id) = self.table.get(key).map(Object::id) else {
            return false;
        };
        if has_expired(self, id) {
            self.remove_entry(key, RemovalCause::Expired);
            return false;
        }

        if touch {
            let now = self.current_clock();
            let log_factor = self.config.lfu_log_factor;
            if let Some(obj) = self.table.get_mut(key) {
                obj.touch(now, log_factor);
            }
            if let (Some(strategy), Some(obj)) = (self.strategy.as_mut(), self.table.get(key)) {
                strategy.on_access(key, obj, AccessType::Get);
            }
        }
        true
    }

    /// Reads several keys at once; each slot is `None` for a missing or
    /// expired key.
    pub fn get_all(&mut self, keys: &[&str]) -> Vec<Option<&Object>> {
        let live: Vec<bool> = keys.iter().map(|key| self.access(key, true)).collect();
        self.stats.gets += keys.len() as u64;

        let table = &self.table;
        let stats = &mut self.stats;
        keys.iter()
            .zip(live)
            .map(|(key, live)| {
                if live {
                    stats.hits += 1;
                    table.get(key)
                } else {
                    stats.misses += 1;
                    None
                }
            })
            .collect()
    }

    /// Removes and returns the object under `key`, unless it already expired.
    pub fn get_del(&mut self, key: &str) -> Option<Object> {
        let id = self.table.get(key).map(Object::id)?;
        if has_expired(self, id) {
            self.remove_entry(key, RemovalCause::Expired);
            return None;
        }
        self.remove_entry(key, RemovalCause::Deleted)
    }

    /// Removes `key` and its TTL. Returns whether a key was removed.
    pub fn del(&mut self, key: &str) -> bool {
        self.remove_entry(key, RemovalCause::Deleted).is_some()
    }

    /// Removes `key` on behalf of an eviction strategy.
    pub fn evict_key(&mut self, key: &str) -> bool {
        self.remove_entry(key, RemovalCause::Evicted).is_some()
    }

    /// Removes `key` because its TTL passed.
    pub(crate) fn expire_key(&mut self, key: &str) -> bool {
        self.remove_entry(key, RemovalCause::Expired).is_some()
    }

    fn remove_entry(&mut self, key: &str, cause: RemovalCause) -> Option<Object> {
        let obj = self.table.remove(key)?;
        self.expires.remove(obj.id());
        self.num_keys = self.num_keys.saturating_sub(1);

        match cause {
            RemovalCause::Deleted => self.stats.dels += 1,
            RemovalCause::Expired => self.stats.expired += 1,
            RemovalCause::Evicted => self.stats.evicted += 1,
        }
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.on_access(key, &obj, AccessType::Del);
        }
        Some(obj)
    }

    /// Moves the object under `src` to `dst`, replacing whatever `dst` held.
    ///
    /// The object keeps its identity, and with it its TTL. Returns `false` if
    /// `src` is missing or expired; renaming a key onto itself is a no-op that
    /// returns `true`.
    pub fn rename(&mut self, src: &str, dst: &str) -> bool {
        if src == dst {
            return true;
        }

        let Some(id) = self.table.get(src).map(Object::id) else {
            return false;
        };
        if has_expired(self, id) {
            self.remove_entry(src, RemovalCause::Expired);
            return false;
        }

        let Some(obj) = self.table.remove(src) else {
            return false;
        };
        if let Some(replaced) = self.table.insert(dst.to_string(), obj) {
            self.expires.remove(replaced.id());
            self.num_keys = self.num_keys.saturating_sub(1);
        }
        true
    }

    /// Returns every live key matching the glob `pattern`.
    ///
    /// Expired keys are skipped but not removed.
    pub fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let glob = GlobPattern::new(pattern)?;
        let mut keys = Vec::new();
        self.table.all(|key, obj| {
            if !has_expired(self, obj.id()) && glob.matches(key) {
                keys.push(key.to_string());
            }
            true
        });
        Ok(keys)
    }

    /// Sets a TTL of `duration_ms` from now. Negative durations expire the
    /// object immediately.
    pub fn set_expiry(&mut self, id: ObjectId, duration_ms: i64) {
        let at = (self.now_ms() as i64).saturating_add(duration_ms).max(0) as u64;
        self.expires.set(id, at);
    }

    /// Sets the expiry to an absolute Unix time in seconds.
    pub fn set_unix_time_expiry(&mut self, id: ObjectId, unix_sec: i64) {
        let at = unix_sec.saturating_mul(1000).max(0) as u64;
        self.expires.set(id, at);
    }

    /// Sets the expiry to an absolute epoch time in milliseconds.
    pub fn set_expiry_at_ms(&mut self, id: ObjectId, at_ms: u64) {
        self.expires.set(id, at_ms);
    }

    /// Absolute expiry of `id` in epoch milliseconds, if it has a TTL.
    pub fn get_expiry(&self, id: ObjectId) -> Option<u64> {
        self.expires.get(id)
    }

    /// Clears the TTL of `id`. Returns whether one was set.
    pub fn del_expiry(&mut self, id: ObjectId) -> bool {
        self.expires.remove(id).is_some()
    }

    /// Remaining TTL of `key` in milliseconds.
    ///
    /// `None` if the key is missing or expired, `Some(-1)` if it has no TTL.
    ///
    /// Reaps the key if it has expired, but is not counted as a read in
    /// [`StoreStats`].
    pub fn ttl_ms(&mut self, key: &str) -> Option<i64> {
        if !self.access(key, false) {
            return None;
        }
        let id = self.table.get(key).map(Object::id)?;
        match self.expires.get(id) {
            Some(at) => Some(at.saturating_sub(self.now_ms()) as i64),
            None => Some(-1),
        }
    }

    /// Live key counter.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.num_keys
    }

    /// Number of entries in the key table, including expired keys that have
    /// not been reaped yet.
    pub fn db_size(&self) -> usize {
        self.table.len()
    }

    /// The underlying key table, for scanning collaborators.
    pub fn get_store(&self) -> &KeyTable {
        &self.table
    }

    pub(crate) fn expiry_table(&self) -> &ExpiryTable {
        &self.expires
    }

    /// Drops every key and TTL.
    pub fn reset_store(&mut self) {
        self.table.clear();
        self.expires.clear();
        self.num_keys = 0;
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.num_keys as u64,
            ..self.stats
        }
    }

    /// Counters of the eviction strategy, unless a pass is running.
    pub fn eviction_stats(&self) -> Option<EvictionStats> {
        self.strategy.as_ref().map(|s| s.stats())
    }
}
