//! Shard Manager
//!
//! Splits the keyspace across a fixed set of shards and supervises their
//! loops. Keys are routed by a stable hash:
//!
//! ```text
//!   "user:1" ──hash──▶ 0x9f3c..  % N ──▶ shard 3 ──▶ ShardThread ──▶ Store
//! ```
//!
//! The shard count is fixed for the lifetime of the manager, so a key always
//! lands on the same shard.

use super::thread::ShardThread;
use crate::config::{Config, MAX_SHARDS};
use crate::error::ShardError;
use crate::storage::{new_strategy, Store};
use std::future::Future;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Maps `key` to a shard index in `0..shard_count`.
#[inline]
pub fn shard_index(key: &str, shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % shard_count.max(1)
}

/// One partition of the keyspace.
#[derive(Debug, Clone)]
pub struct Shard {
    id: usize,
    thread: Arc<ShardThread>,
}

impl Shard {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn thread(&self) -> &Arc<ShardThread> {
        &self.thread
    }
}

#[derive(Debug)]
pub struct ShardManager {
    shards: Vec<Shard>,
    error_tx: mpsc::UnboundedSender<ShardError>,
}

impl ShardManager {
    /// Creates `shard_count` shards, each with its own store and eviction
    /// strategy sized to an even share of `config.keys_limit`.
    ///
    /// Shard failures are reported on `error_tx` while [`run`](Self::run) is
    /// active.
    pub fn new(
        shard_count: usize,
        config: &Config,
        error_tx: mpsc::UnboundedSender<ShardError>,
    ) -> Self {
        let shard_count = shard_count.clamp(1, MAX_SHARDS);
        let store_config = config.store_config(shard_count);

        let shards = (0..shard_count)
            .map(|id| {
                let strategy = new_strategy(config.eviction_policy, &store_config);
                let thread = ShardThread::new(
                    id,
                    store_config,
                    strategy,
                    config.shard_cron_frequency,
                    config.shard_request_buffer,
                );
                Shard {
                    id,
                    thread: Arc::new(thread),
                }
            })
            .collect();

        info!(
            shards = shard_count,
            keys_per_shard = store_config.keys_limit,
            policy = %config.eviction_policy,
            "Shard manager initialized"
        );

        Self { shards, error_tx }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn get_shard(&self, id: usize) -> Option<&Shard> {
        self.shards.get(id)
    }

    /// The shard owning `key`.
    pub fn get_shard_for_key(&self, key: &str) -> &Shard {
        &self.shards[shard_index(key, self.shards.len())]
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Routes `f` to the shard owning `key` and runs it there.
    pub async fn execute<F, R>(&self, key: &str, f: F) -> Result<R, ShardError>
    where
        F: FnOnce(&mut Store) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.get_shard_for_key(key).thread.execute(f).await
    }

    /// Starts every shard and waits until all of them have stopped.
    ///
    /// Shards stop when `shutdown` turns `true` (or its sender is dropped),
    /// or when the process receives SIGINT or SIGTERM. A shard that fails or
    /// panics is reported on the error channel as soon as it happens; the
    /// others keep running.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        self.run_until(shutdown_signal(shutdown)).await
    }

    /// Like [`run`](Self::run), but stops the shards once `stop` completes.
    pub async fn run_until<F>(&self, stop: F)
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut supervisors = JoinSet::new();

        for shard in &self.shards {
            let shard_id = shard.id;
            let task = tokio::spawn(Arc::clone(&shard.thread).start(stop_rx.clone()));
            let error_tx = self.error_tx.clone();

            supervisors.spawn(async move {
                let failure = match task.await {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => {
                        error!(shard_id, error = %err, "Shard exited with an error");
                        Some(err)
                    }
                    Err(join_err) if join_err.is_panic() => {
                        error!(shard_id, "Shard panicked");
                        Some(ShardError::Panicked { shard_id })
                    }
                    Err(_) => {
                        warn!(shard_id, "Shard task was cancelled");
                        Some(ShardError::Stopped { shard_id })
                    }
                };
                if let Some(err) = failure {
                    let _ = error_tx.send(err);
                }
            });
        }

        info!(shards = self.shards.len(), "All shards started");

        tokio::select! {
            _ = stop => info!("Stopping shards..."),
            _ = async { while supervisors.join_next().await.is_some() {} } => {}
        }

        let _ = stop_tx.send(true);
        while supervisors.join_next().await.is_some() {}

        info!("All shards stopped");
    }
}

/// Completes when `shutdown` turns `true` or loses its sender, or when an
/// interrupt or termination signal arrives.
async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    let cancelled = async {
        let _ = shutdown.wait_for(|stop| *stop).await;
    };

    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for interrupt signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for termination signal");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = cancelled => debug!("Shutdown requested"),
        _ = interrupt => info!("Interrupt signal received"),
        _ = terminate => info!("Termination signal received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionPolicy;
    use crate::shard::{ShardHook, ShardState};
    use crate::storage::{Object, ObjectType, PutOptions, StoreConfig};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_test::assert_ok;

    fn test_config(keys_limit: usize) -> Config {
        Config {
            keys_limit,
            eviction_policy: EvictionPolicy::AllKeysLru,
            shard_cron_frequency: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_splits_keys_limit() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = ShardManager::new(4, &test_config(10), tx);
        assert_eq!(manager.shard_count(), 4);
        for (i, shard) in manager.shards().iter().enumerate() {
            assert_eq!(shard.id(), i);
            let limit = shard
                .thread()
                .with_store_rlock(|store| store.config().keys_limit);
            assert_eq!(limit, 3);
        }
        assert!(manager.get_shard(4).is_none());
    }

    #[test]
    fn test_shard_count_is_clamped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        assert_eq!(ShardManager::new(0, &test_config(10), tx.clone()).shard_count(), 1);
        assert_eq!(
            ShardManager::new(MAX_SHARDS + 10, &test_config(10), tx).shard_count(),
            MAX_SHARDS
        );
    }

    #[tokio::test]
    async fn test_execute_routes_to_owning_shard() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = Arc::new(ShardManager::new(8, &test_config(1_000), tx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.run(shutdown_rx).await }
        });

        for i in 0..64 {
            let key = format!("user:{}", i);
            let owned = key.clone();
            assert_ok!(
                manager
                    .execute(&key, move |store| {
                        store.put(owned, Object::new("v", ObjectType::String), PutOptions::default())
                    })
                    .await
            );
        }

        for i in 0..64 {
            let key = format!("user:{}", i);
            let owner = manager.get_shard_for_key(&key).id();
            for shard in manager.shards() {
                let found = shard
                    .thread()
                    .with_store_lock(|store| store.get_no_touch(&key).is_some());
                assert_eq!(found, shard.id() == owner, "{} on shard {}", key, shard.id());
            }
        }

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_isolated() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let manager = Arc::new(ShardManager::new(4, &test_config(1_000), tx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.run(shutdown_rx).await }
        });

        let doomed = manager.get_shard_for_key("doomed").id();
        let survivor = (0..100)
            .map(|i| format!("other:{}", i))
            .find(|key| manager.get_shard_for_key(key).id() != doomed)
            .unwrap();

        let result = manager.execute("doomed", |_| -> () { panic!("boom") }).await;
        assert!(matches!(result, Err(ShardError::Stopped { .. })));

        let reported = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(reported, ShardError::Panicked { shard_id } if shard_id == doomed));

        assert_ok!(manager.execute(&survivor, |store| store.key_count()).await);
        assert!(manager.execute("doomed", |store| store.key_count()).await.is_err());

        shutdown_tx.send(true).unwrap();
        runner.await.unwrap();
    }

    struct FlushCounter(Arc<AtomicUsize>);

    impl ShardHook for FlushCounter {
        fn on_cleanup(&self, _shard_id: usize, _store: &Store) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_stop_signal_drains_every_shard() {
        let flushed = Arc::new(AtomicUsize::new(0));
        let (error_tx, mut error_rx) = mpsc::unbounded_channel();
        let shards = (0..3)
            .map(|id| {
                let config = StoreConfig::default();
                let strategy = new_strategy(EvictionPolicy::AllKeysLru, &config);
                let thread = ShardThread::new(id, config, strategy, Duration::from_millis(10), 16)
                    .with_hook(Box::new(FlushCounter(Arc::clone(&flushed))));
                Shard {
                    id,
                    thread: Arc::new(thread),
                }
            })
            .collect();
        let manager = Arc::new(ShardManager { shards, error_tx });

        // stands in for SIGTERM
        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        let runner = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move {
                manager
                    .run_until(async {
                        let _ = signal_rx.await;
                    })
                    .await
            }
        });

        assert_ok!(manager.execute("k", |store| store.key_count()).await);
        signal_tx.send(()).unwrap();
        runner.await.unwrap();

        assert_eq!(flushed.load(Ordering::SeqCst), 3);
        for shard in manager.shards() {
            assert_eq!(shard.thread().state(), ShardState::Stopped);
        }
        assert!(error_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_stops_when_shutdown_sender_dropped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let manager = ShardManager::new(2, &test_config(100), tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(1), manager.run(shutdown_rx))
            .await
            .unwrap();
        assert!(manager
            .shards()
            .iter()
            .all(|shard| shard.thread().state() == ShardState::Stopped));
    }

    proptest! {
        #[test]
        fn prop_routing_is_deterministic(key in ".{0,32}", count in 1usize..=MAX_SHARDS) {
            let first = shard_index(&key, count);
            prop_assert!(first < count);
            prop_assert_eq!(first, shard_index(&key, count));
        }
    }
}
