//! Storage Module
//!
//! This module provides the per-shard storage core: the [`Store`], its
//! objects, TTL handling and capacity-driven eviction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── Store ─────────────────────────────┐
//! │                                                                │
//! │  ┌──────────────┐   ┌──────────────┐   ┌────────────────────┐  │
//! │  │   KeyTable   │   │ ExpiryTable  │   │  EvictionStrategy  │  │
//! │  │ key ─▶ Object│   │ ObjectId ─▶ ms│   │ (one per shard)    │  │
//! │  └──────────────┘   └──────────────┘   └────────────────────┘  │
//! │                                                                │
//! └────────────────────────────────────────────────────────────────┘
//!          ▲ lazy expiry on reads         ▲ evict before insert
//!          │                              │
//!   delete_expired_keys  (shard cron)   put(new key)
//! ```
//!
//! ## Features
//!
//! - **Single Writer**: a store is owned by exactly one shard task, no locks inside
//! - **Lazy + Active Expiry**: reads drop expired keys, the cron samples for more
//! - **Approximate LRU/LFU**: a 24-bit clock and an 8-bit counter per object
//! - **Pluggable Eviction**: simple, random, sampled LRU/LFU, exact batch LRU
//!
//! ## Example
//!
//! ```
//! use shardkv::config::EvictionPolicy;
//! use shardkv::storage::{new_strategy, ObjectType, PutOptions, Store, StoreConfig};
//!
//! let config = StoreConfig { keys_limit: 1_000, ..Default::default() };
//! let mut store = Store::new(config, new_strategy(EvictionPolicy::BatchKeysLru, &config));
//!
//! // Set with a one hour TTL
//! let session = store.new_obj("token123", Some(3_600_000), ObjectType::String);
//! store.put("session", session, PutOptions::default());
//!
//! assert!(store.get("session").is_some());
//! assert!(store.ttl_ms("session").unwrap() > 0);
//! ```

pub mod clock;
pub mod eviction;
pub mod expiry;
pub mod glob;
pub mod object;
pub mod store;
pub mod table;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use eviction::{new_strategy, AccessType, EvictionStats, EvictionStrategy};
pub use expiry::{delete_expired_keys, evaluate_and_set_expiry, has_expired, ExpiryFlag};
pub use object::{Object, ObjectId, ObjectType, Value};
pub use store::{PutOptions, Store, StoreConfig, StoreStats};
pub use table::KeyTable;
