//! # ShardKV - A Sharded In-Memory Storage Engine
//!
//! ShardKV is the storage core of a Redis-style in-memory database: a fixed
//! set of shards, each a single Tokio task owning one keyspace partition, with
//! TTL expiry and capacity-driven eviction.
//!
//! ## Features
//!
//! - **Shared-Nothing Shards**: one task per shard, no locks on the hot path
//! - **TTL Support**: lazy expiry on reads plus sampled active expiry on a cron
//! - **Eviction Policies**: simple, random, approximated LRU/LFU, exact batch LRU
//! - **Async I/O**: built on Tokio; callers `await` results from shard loops
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              ShardKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   Caller    │───>│                ShardManager                  │    │
//! │  │ (command    │    │   hash(key) % N                              │    │
//! │  │  layer)     │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  └─────────────┘    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │    │
//! │                     │  │ Store  │ │ Store  │ │ Store  │ │ shards │ │    │
//! │                     │  │ cron   │ │ cron   │ │ cron   │ │        │ │    │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: engine configuration, environment loading, eviction policies
//! - [`error`]: error types
//! - [`storage`]: the per-shard store, expiry and eviction
//! - [`shard`]: shard loops and the shard manager
//!
//! ## Design Highlights
//!
//! ### Single Writer per Shard
//!
//! Every store is mutated only by its shard's loop. Work arrives over a
//! bounded channel and runs to completion before the next item, so ordering
//! within a shard is strict and the store needs no internal synchronization.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Active**: Each shard's cron samples keys and deletes expired ones
//!
//! ### Approximate Recency and Frequency
//!
//! Each object packs a 24-bit seconds clock and an 8-bit logarithmic access
//! counter into one `u32`, which the eviction strategies read lazily.

pub mod config;
pub mod error;
pub mod shard;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{Config, EvictionPolicy};
pub use error::{ConfigError, ShardError, StoreError};
pub use shard::{ShardManager, ShardThread};
pub use storage::{Object, ObjectType, PutOptions, Store, StoreConfig};

/// Version of ShardKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
