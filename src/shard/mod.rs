//! Shard Module
//!
//! The keyspace is partitioned across a fixed number of shards. Each shard is
//! a single Tokio task that owns one [`Store`](crate::storage::Store) and
//! processes work items strictly in order, so the store itself needs no
//! internal locking.
//!
//! ```text
//!                         ┌──────────────────┐
//!   execute(key, f) ────▶ │   ShardManager   │
//!                         └────────┬─────────┘
//!                 hash(key) % N    │
//!         ┌───────────────┬────────┴───────┬───────────────┐
//!         ▼               ▼                ▼               ▼
//!   ┌───────────┐   ┌───────────┐    ┌───────────┐   ┌───────────┐
//!   │ Shard 0   │   │ Shard 1   │    │ Shard 2   │   │ Shard N-1 │
//!   │ mpsc loop │   │ mpsc loop │    │ mpsc loop │   │ mpsc loop │
//!   │ + cron    │   │ + cron    │    │ + cron    │   │ + cron    │
//!   └───────────┘   └───────────┘    └───────────┘   └───────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use shardkv::config::Config;
//! use shardkv::shard::ShardManager;
//! use shardkv::storage::{Object, ObjectType, PutOptions};
//! use std::sync::Arc;
//! use tokio::sync::{mpsc, watch};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), shardkv::ShardError> {
//! let (error_tx, _error_rx) = mpsc::unbounded_channel();
//! let manager = Arc::new(ShardManager::new(4, &Config::default(), error_tx));
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let runner = tokio::spawn({
//!     let manager = Arc::clone(&manager);
//!     async move { manager.run(shutdown_rx).await }
//! });
//!
//! manager
//!     .execute("name", |store| {
//!         store.put("name", Object::new("Ariz", ObjectType::String), PutOptions::default())
//!     })
//!     .await?;
//! let found = manager.execute("name", |store| store.get("name").is_some()).await?;
//! assert!(found);
//!
//! let _ = shutdown_tx.send(true);
//! let _ = runner.await;
//! # Ok(())
//! # }
//! ```

pub mod manager;
pub mod thread;

pub use manager::{shard_index, Shard, ShardManager};
pub use thread::{ShardHook, ShardState, ShardThread, Work};
