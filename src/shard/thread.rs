//! Shard Thread
//!
//! A [`ShardThread`] serializes all access to one [`Store`]. Its loop is a
//! Tokio task selecting over three events:
//!
//! ```text
//!                  ┌─────────────────────────────┐
//!   shutdown ────▶ │                             │ ──▶ Draining ──▶ cleanup hook ──▶ Stopped
//!   cron tick ───▶ │  ShardThread::start (loop)  │ ──▶ delete_expired_keys(store)
//!   work item ───▶ │                             │ ──▶ f(&mut store) ──▶ oneshot reply
//!                  └─────────────────────────────┘
//! ```
//!
//! Work items run one at a time, in arrival order, and never concurrently with
//! the cron. A panic inside a work item is not caught: it ends the loop, the
//! shard moves to [`ShardState::Stopped`] and every pending or later caller
//! gets [`ShardError::Stopped`].

use crate::error::ShardError;
use crate::storage::{delete_expired_keys, EvictionStrategy, Store, StoreConfig};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

/// A unit of work executed against a shard's store.
pub type Work = Box<dyn FnOnce(&mut Store) + Send + 'static>;

/// Lifecycle of a shard loop.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Created, loop not started yet; work is buffered
    Idle = 0,
    /// Loop is serving work and cron ticks
    Running = 1,
    /// Shutdown observed, running cleanup
    Draining = 2,
    /// Loop has exited
    Stopped = 3,
}

impl ShardState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ShardState::Idle,
            1 => ShardState::Running,
            2 => ShardState::Draining,
            _ => ShardState::Stopped,
        }
    }
}

/// Callback run while a shard drains, before it stops.
///
/// This is where a persistence layer flushes the shard's keyspace.
pub trait ShardHook: Send + Sync {
    fn on_cleanup(&self, shard_id: usize, store: &Store) -> anyhow::Result<()>;
}

pub struct ShardThread {
    id: usize,
    store: Arc<RwLock<Store>>,
    state: AtomicU8,
    last_cron_exec_ms: AtomicU64,
    cron_frequency: Duration,
    request_tx: mpsc::Sender<Work>,
    /// Taken by the loop when it starts
    request_rx: Mutex<Option<mpsc::Receiver<Work>>>,
    hook: Option<Box<dyn ShardHook>>,
}

impl fmt::Debug for ShardThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardThread")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("cron_frequency", &self.cron_frequency)
            .field("last_cron_exec_ms", &self.last_cron_exec_ms())
            .finish()
    }
}

/// Marks the shard stopped however the loop exits, unwinding included.
struct StopGuard<'a> {
    thread: &'a ShardThread,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.thread.set_state(ShardState::Stopped);
        if std::thread::panicking() {
            error!(shard_id = self.thread.id, "Shard loop panicked, shard stopped");
        } else {
            info!(shard_id = self.thread.id, "Shard stopped");
        }
    }
}

impl ShardThread {
    /// Creates a shard with an empty store.
    pub fn new(
        id: usize,
        config: StoreConfig,
        strategy: Box<dyn EvictionStrategy>,
        cron_frequency: Duration,
        request_buffer: usize,
    ) -> Self {
        Self::with_store(id, Store::new(config, strategy), cron_frequency, request_buffer)
    }

    /// Creates a shard around an existing store.
    pub fn with_store(
        id: usize,
        store: Store,
        cron_frequency: Duration,
        request_buffer: usize,
    ) -> Self {
        let (request_tx, request_rx) = mpsc::channel(request_buffer.max(1));
        Self {
            id,
            store: Arc::new(RwLock::new(store)),
            state: AtomicU8::new(ShardState::Idle as u8),
            last_cron_exec_ms: AtomicU64::new(0),
            cron_frequency,
            request_tx,
            request_rx: Mutex::new(Some(request_rx)),
            hook: None,
        }
    }

    /// Installs the cleanup hook.
    pub fn with_hook(mut self, hook: Box<dyn ShardHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> ShardState {
        ShardState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ShardState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Epoch milliseconds of the last cron tick, zero before the first.
    pub fn last_cron_exec_ms(&self) -> u64 {
        self.last_cron_exec_ms.load(Ordering::Relaxed)
    }

    /// Runs the shard loop until `shutdown` turns `true` or its sender is
    /// dropped.
    ///
    /// Returns once the shard has drained and stopped. A shard can only be
    /// started once.
    pub async fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), ShardError> {
        let Some(mut requests) = self.request_rx.lock().take() else {
            return Err(ShardError::AlreadyStarted { shard_id: self.id });
        };

        let _guard = StopGuard { thread: &self };
        self.set_state(ShardState::Running);
        info!(
            shard_id = self.id,
            cron_ms = self.cron_frequency.as_millis() as u64,
            "Shard started"
        );

        let mut cron = tokio::time::interval(self.cron_frequency);
        cron.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        cron.tick().await;

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    biased;

                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            debug!(shard_id = self.id, "Shard received shutdown signal");
                            break;
                        }
                    }
                    _ = cron.tick() => self.run_cron(),
                    work = requests.recv() => match work {
                        Some(work) => {
                            let mut store = self.store.write();
                            work(&mut store);
                        }
                        None => break,
                    },
                }
            }
        }

        self.set_state(ShardState::Draining);
        // queued work is dropped unanswered, so its callers see `Stopped`
        requests.close();
        drop(requests);
        self.cleanup()
    }

    fn run_cron(&self) {
        let (deleted, now_ms) = {
            let mut store = self.store.write();
            (delete_expired_keys(&mut store), store.now_ms())
        };
        self.last_cron_exec_ms.store(now_ms, Ordering::Relaxed);
        trace!(shard_id = self.id, deleted, "Shard cron tick");
    }

    fn cleanup(&self) -> Result<(), ShardError> {
        let Some(hook) = &self.hook else {
            return Ok(());
        };
        let store = self.store.read();
        hook.on_cleanup(self.id, &store)
            .map_err(|source| ShardError::Cleanup {
                shard_id: self.id,
                source,
            })
    }

    /// Runs `f` against the store on the shard's loop and returns its result.
    ///
    /// Calls from one task are executed in the order they are made.
    pub async fn execute<F, R>(&self, f: F) -> Result<R, ShardError>
    where
        F: FnOnce(&mut Store) -> R + Send + 'static,
        R: Send + 'static,
    {
        let stopped = ShardError::Stopped { shard_id: self.id };
        if matches!(self.state(), ShardState::Draining | ShardState::Stopped) {
            return Err(stopped);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let work: Work = Box::new(move |store| {
            let _ = reply_tx.send(f(store));
        });
        if self.request_tx.send(work).await.is_err() {
            return Err(stopped);
        }
        reply_rx.await.map_err(|_| stopped)
    }

    /// The shard's store.
    ///
    /// Prefer [`execute`](Self::execute); the loop holds the write lock while
    /// it runs work, so this is only for out-of-band access.
    pub fn store(&self) -> &Arc<RwLock<Store>> {
        &self.store
    }

    /// Runs `f` with exclusive access to the store from outside the loop.
    ///
    /// Must not be called from inside a work item of the same shard.
    pub fn with_store_lock<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        let mut store = self.store.write();
        f(&mut store)
    }

    /// Runs `f` with shared access to the store from outside the loop.
    pub fn with_store_rlock<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        let store = self.store.read();
        f(&store)
    }
}
