//! Key Expiry
//!
//! TTLs live in an [`ExpiryTable`] keyed by [`ObjectId`], separate from the
//! key table, so only objects that actually carry a TTL pay for one.
//!
//! Keys are expired in two ways:
//!
//! 1. **Lazy**: every read path checks [`has_expired`] and deletes on the spot.
//! 2. **Active**: the owning shard's cron tick calls [`delete_expired_keys`],
//!    which samples the keyspace instead of scanning it.
//!
//! ## Active Expiry Loop
//!
//! ```text
//!   loop {
//!       sample 20 keys ──▶ delete the expired ones
//!       if expired / 20 < 0.25 { stop }
//!   }
//! ```
//!
//! A burst of simultaneous expiries keeps the loop going until the expired
//! fraction drops, while a mostly-live keyspace costs a single sample.

use super::object::{Object, ObjectId};
use super::store::Store;
use crate::error::StoreError;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

/// Keys sampled per active-expiry round.
pub const EXPIRE_SAMPLE_SIZE: usize = 20;

/// Expired fraction of a sample at which another round runs.
pub const EXPIRE_LOOP_THRESHOLD: f64 = 0.25;

/// Object handle → absolute expiry in epoch milliseconds.
#[derive(Debug, Default)]
pub struct ExpiryTable {
    entries: HashMap<ObjectId, u64>,
}

impl ExpiryTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, id: ObjectId) -> Option<u64> {
        self.entries.get(&id).copied()
    }

    /// Sets the expiry of `id`, returning the previous one.
    pub fn set(&mut self, id: ObjectId, at_ms: u64) -> Option<u64> {
        self.entries.insert(id, at_ms)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<u64> {
        self.entries.remove(&id)
    }

    #[inline]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Whether the object `id` has a TTL at or before the store's current time.
#[inline]
pub fn has_expired(store: &Store, id: ObjectId) -> bool {
    store
        .get_expiry(id)
        .is_some_and(|at| at <= store.now_ms())
}

/// Actively removes expired keys by repeated sampling.
///
/// Returns the number of keys deleted.
pub fn delete_expired_keys(store: &mut Store) -> usize {
    if store.expiry_table().is_empty() {
        return 0;
    }

    let mut rng = rand::thread_rng();
    let mut deleted = 0;
    loop {
        let expired: Vec<String> = store
            .get_store()
            .sample(EXPIRE_SAMPLE_SIZE, &mut rng)
            .into_iter()
            .filter(|(_, obj)| has_expired(store, obj.id()))
            .map(|(key, _)| key.to_string())
            .collect();

        for key in &expired {
            if store.expire_key(key) {
                deleted += 1;
            }
        }

        if (expired.len() as f64 / EXPIRE_SAMPLE_SIZE as f64) < EXPIRE_LOOP_THRESHOLD {
            break;
        }
    }

    if deleted > 0 {
        debug!(
            expired = deleted,
            keys_remaining = store.key_count(),
            "Expired keys cleaned up"
        );
    }
    deleted
}

/// A condition of a conditional TTL update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryFlag {
    /// Only if the key has no TTL
    Nx,
    /// Only if the key already has a TTL
    Xx,
    /// Only if the new expiry is later than the current one
    Gt,
    /// Only if the new expiry is earlier than the current one
    Lt,
}

impl FromStr for ExpiryFlag {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NX" => Ok(ExpiryFlag::Nx),
            "XX" => Ok(ExpiryFlag::Xx),
            "GT" => Ok(ExpiryFlag::Gt),
            "LT" => Ok(ExpiryFlag::Lt),
            _ => Err(StoreError::UnsupportedExpiryOption(s.to_string())),
        }
    }
}

/// Applies `new_expiry_ms` (absolute, epoch milliseconds) to `key` if every
/// condition in `flags` holds.
///
/// Flags are validated before the key is looked up. Returns `Ok(false)` when
/// the key is missing or a condition fails, and an error for an unknown flag
/// or an incompatible combination.
pub fn evaluate_and_set_expiry(
    store: &mut Store,
    flags: &[&str],
    new_expiry_ms: u64,
    key: &str,
) -> Result<bool, StoreError> {
    let (mut nx, mut xx, mut gt, mut lt) = (false, false, false, false);
    for flag in flags {
        match flag.parse::<ExpiryFlag>()? {
            ExpiryFlag::Nx => nx = true,
            ExpiryFlag::Xx => xx = true,
            ExpiryFlag::Gt => gt = true,
            ExpiryFlag::Lt => lt = true,
        }
    }

    if nx && (xx || gt || lt) {
        return Err(StoreError::IncompatibleExpiryOptions(
            "NX and XX, GT or LT options at the same time are not compatible",
        ));
    }
    if gt && lt {
        return Err(StoreError::IncompatibleExpiryOptions(
            "GT and LT options at the same time are not compatible",
        ));
    }

    let Some(id) = store.get_no_touch(key).map(Object::id) else {
        return Ok(false);
    };
    let current = store.get_expiry(id);

    let apply = if nx {
        current.is_none()
    } else {
        (!xx || current.is_some())
            && (!gt || current.is_some_and(|at| new_expiry_ms > at))
            && (!lt || current.is_some_and(|at| new_expiry_ms < at))
    };

    if apply {
        store.set_expiry_at_ms(id, new_expiry_ms);
    }
    Ok(apply)
}
