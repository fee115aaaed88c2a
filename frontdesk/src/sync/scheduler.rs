//! SyncScheduler: per-key debounce timers
//!
//! At most one operation is pending per key. Scheduling a key again before
//! its timer fires replaces the pending operation and restarts the timer, so
//! a burst of writes collapses into a single remote call carrying the latest
//! state. Keys are independent; there is no ordering across them.
//!
//! ```text
//! schedule("res-RES-00001", op1) ─┐
//! schedule("res-RES-00001", op2) ─┼─ debounce ─→ op3()
//! schedule("res-RES-00001", op3) ─┘
//! ```
//!
//! Once a timer has fired, its operation runs to completion even if the key
//! is scheduled again meanwhile. [`SyncScheduler::flush`] waits for those too.

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

type OpFactory = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct PendingOp {
    generation: u64,
    cancel: CancellationToken,
    op: Mutex<OpFactory>,
}

#[derive(Default)]
struct SchedulerInner {
    pending: DashMap<String, PendingOp>,
    next_generation: AtomicU64,
    /// Timer tasks, including ops that fired and are still running
    tasks: TaskTracker,
}

/// Debounced per-key scheduler
#[derive(Clone, Default)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl SyncScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` after `delay` unless `key` is scheduled again first
    ///
    /// Must be called from within a tokio runtime; outside one the call is
    /// logged and dropped.
    pub fn schedule<F, Fut>(&self, key: impl Into<String>, delay: Duration, op: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(key = %key, "No async runtime, dropping scheduled sync op");
            return;
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let pending = PendingOp {
            generation,
            cancel: cancel.clone(),
            op: Mutex::new(Box::new(move || op().boxed())),
        };

        if let Some(previous) = self.inner.pending.insert(key.clone(), pending) {
            previous.cancel.cancel();
            tracing::debug!(key = %key, "Debounced sync op replaced");
        } else {
            tracing::debug!(key = %key, delay_ms = delay.as_millis() as u64, "Sync op scheduled");
        }

        let inner = Arc::clone(&self.inner);
        let timer = self.inner.tasks.track_future(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let fired = inner
                        .pending
                        .remove_if(&key, |_, p| p.generation == generation);
                    if let Some((_, pending)) = fired {
                        tracing::debug!(key = %key, "Sync op fired");
                        (pending.op.into_inner())().await;
                    }
                }
            }
        });
        runtime.spawn(timer);
    }

    /// Run every pending operation now, in no particular order, then wait
    /// for operations that had already fired
    pub async fn flush(&self) {
        let keys: Vec<String> = self
            .inner
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        if !keys.is_empty() {
            tracing::info!(pending = keys.len(), "Flushing pending sync ops");
        }
        for key in keys {
            if let Some((_, pending)) = self.inner.pending.remove(&key) {
                pending.cancel.cancel();
                (pending.op.into_inner())().await;
            }
        }

        let tasks = &self.inner.tasks;
        tasks.close();
        tasks.wait().await;
        tasks.reopen();
    }

    /// Drop every pending operation without running it
    pub fn cancel_all(&self) {
        self.inner.pending.retain(|_, pending| {
            pending.cancel.cancel();
            false
        });
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.pending.contains_key(key)
    }
}
