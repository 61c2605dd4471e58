//! Background Task Pool
//!
//! Bounded queue of fire-and-forget jobs (cache writes, refreshes) drained
//! by a fixed set of workers.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;

type Job = BoxFuture<'static, ()>;

struct PoolInner {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    rejected: AtomicU64,
}

/// Handle to a pool of background workers. Clones share the same pool.
///
/// Submitting never blocks: when the queue is full the job is rejected and
/// counted, see [`TaskPool::rejected`].
#[derive(Clone)]
pub struct TaskPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPool")
            .field("pending", &self.pending())
            .field("rejected", &self.rejected())
            .finish()
    }
}

impl TaskPool {
    /// Spawns `workers` tasks draining a queue of at most `capacity` jobs.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `workers` - Number of concurrent workers (at least one is started)
    /// * `capacity` - Queue bound (at least one)
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..workers)
            .map(|id| {
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else { break };
                        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                            error!("Background job panicked on worker {}", id);
                        }
                    }
                    debug!("Background worker {} stopped", id);
                })
            })
            .collect();

        info!(
            "Background task pool started: workers={}, capacity={}",
            workers,
            capacity.max(1)
        );

        Self {
            inner: Arc::new(PoolInner {
                sender: Mutex::new(Some(sender)),
                workers: Mutex::new(handles),
                rejected: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a pool sized from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.background_workers, config.background_queue_capacity)
    }

    // == Spawn ==
    /// Queues `job` without waiting.
    ///
    /// Returns `false` if the queue is full or the pool has been shut down;
    /// the job is then dropped and counted as rejected.
    pub fn spawn<F>(&self, job: F) -> bool
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let sender = self.inner.sender.lock().clone();
        let Some(sender) = sender else {
            self.reject("pool is shut down");
            return false;
        };

        match sender.try_send(job.boxed()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.reject("queue is full");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.reject("queue is closed");
                false
            }
        }
    }

    fn reject(&self, reason: &str) {
        let total = self.inner.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("Background job dropped, {} (dropped so far: {})", reason, total);
    }

    /// Number of jobs rejected since the pool started.
    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    /// Number of jobs queued but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        match &*self.inner.sender.lock() {
            Some(sender) => sender.max_capacity() - sender.capacity(),
            None => 0,
        }
    }

    // == Shutdown ==
    /// Stops accepting jobs, then waits for the workers to drain the queue.
    pub async fn shutdown(&self) {
        // Dropping the last sender closes the channel once queued jobs are consumed
        self.inner.sender.lock().take();
        let handles: Vec<_> = self.inner.workers.lock().drain(..).collect();
        for result in future::join_all(handles).await {
            if let Err(err) = result {
                error!("Background worker failed: {}", err);
            }
        }
        info!("Background task pool shut down");
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{oneshot, Notify};

    #[tokio::test]
    async fn test_pool_runs_jobs() {
        let pool = TaskPool::new(2, 8);
        let (tx, rx) = oneshot::channel();

        assert!(pool.spawn(async move {
            tx.send(42).unwrap();
        }));

        assert_eq!(rx.await.unwrap(), 42);
        assert_eq!(pool.rejected(), 0);
    }

    #[tokio::test]
    async fn test_pool_rejects_when_full() {
        let pool = TaskPool::new(1, 1);
        let gate = Arc::new(Notify::new());

        // Occupy the only worker
        let blocker = Arc::clone(&gate);
        assert!(pool.spawn(async move { blocker.notified().await }));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Fill the queue, then overflow it
        assert!(pool.spawn(async {}));
        assert!(!pool.spawn(async {}));
        assert_eq!(pool.rejected(), 1);
        assert_eq!(pool.pending(), 1);

        gate.notify_one();
        pool.shutdown().await;
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let pool = TaskPool::new(1, 16);
        let counter = Arc::new(AtomicU64::new(0));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.spawn(async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_is_rejected() {
        let pool = TaskPool::new(1, 4);
        pool.shutdown().await;

        assert!(!pool.spawn(async {}));
        assert_eq!(pool.rejected(), 1);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = TaskPool::new(1, 4);
        let (tx, rx) = oneshot::channel();

        pool.spawn(async { panic!("boom") });
        pool.spawn(async move {
            tx.send(()).unwrap();
        });

        assert!(rx.await.is_ok());
    }
}
