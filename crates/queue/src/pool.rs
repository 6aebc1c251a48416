//! Bounded worker pool.
//!
//! `WorkerPool` owns `workers` long-lived tokio tasks that pull [`Job`]s off
//! a channel of capacity `queue_capacity`:
//! 1. `submit` never awaits. If the channel is full the job is spawned
//!    straight onto the runtime instead, so a job that submits follow-up work
//!    from inside a worker can never wedge the pool.
//! 2. A panicking job is caught and logged; its worker carries on.
//! 3. `shutdown` cancels the shared token. Workers finish the job they are
//!    running and exit; queued jobs are dropped.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::QueueError;

/// A unit of work accepted by the pool.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Sizing for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker tasks (at least one is always started).
    pub workers: usize,
    /// Jobs that can wait in the channel before submissions overflow.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self {
            workers: cores * 2,
            queue_capacity: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Cheaply cloneable handle to a running pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

struct Inner {
    sender: mpsc::Sender<Job>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    overflowed: AtomicUsize,
}

impl WorkerPool {
    /// Start the workers. Must be called from within a tokio runtime.
    ///
    /// Cancelling `shutdown` stops the pool, exactly like [`WorkerPool::shutdown`].
    pub fn start(config: &PoolConfig, shutdown: CancellationToken) -> Self {
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(config.queue_capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let handles = (0..workers)
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&receiver), shutdown.clone())))
            .collect();

        info!(
            "Worker pool started: workers={}, queue_capacity={}",
            workers, config.queue_capacity
        );

        Self {
            inner: Arc::new(Inner {
                sender,
                shutdown,
                handles: Mutex::new(handles),
                overflowed: AtomicUsize::new(0),
            }),
        }
    }

    /// Queue `job` for execution without waiting.
    ///
    /// # Errors
    /// Returns [`QueueError::Closed`] once the pool has been shut down.
    pub fn submit<F>(&self, job: F) -> Result<(), QueueError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.shutdown.is_cancelled() {
            return Err(QueueError::Closed);
        }

        match self.inner.sender.try_send(Box::pin(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                let total = self.inner.overflowed.fetch_add(1, Ordering::Relaxed) + 1;
                warn!("Worker queue full, running job outside the pool (overflow #{total})");
                tokio::spawn(run_job(job));
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// How many submissions bypassed the queue because it was full.
    pub fn overflow_count(&self) -> usize {
        self.inner.overflowed.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting work and wait for every worker to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handles = match self.inner.handles.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                error!("worker task ended abnormally: {e}");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
) {
    loop {
        let job = {
            let mut receiver = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                guard = receiver.lock() => guard,
            };
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                job = receiver.recv() => job,
            }
        };

        match job {
            Some(job) => run_job(job).await,
            None => break,
        }
    }
    debug!(worker = id, "worker stopped");
}

async fn run_job(job: Job) {
    if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
        error!("job panicked: {}", panic_message(panic.as_ref()));
    }
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{mpsc, Notify};

    fn pool(workers: usize, queue_capacity: usize) -> WorkerPool {
        WorkerPool::start(
            &PoolConfig {
                workers,
                queue_capacity,
            },
            CancellationToken::new(),
        )
    }

    async fn collect(rx: &mut mpsc::UnboundedReceiver<usize>, n: usize) -> Vec<usize> {
        let mut seen = Vec::with_capacity(n);
        for _ in 0..n {
            let value = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("job ran in time")
                .expect("channel open");
            seen.push(value);
        }
        seen.sort_unstable();
        seen
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_every_submitted_job() {
        let pool = pool(3, 16);
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..10 {
            let tx = tx.clone();
            pool.submit(async move {
                tx.send(i).ok();
            })
            .expect("pool open");
        }

        assert_eq!(collect(&mut rx, 10).await, (0..10).collect::<Vec<_>>());
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallelism_is_bounded_by_worker_count() {
        let pool = pool(2, 64);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..8 {
            let (running, peak, tx) = (running.clone(), peak.clone(), tx.clone());
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                tx.send(i).ok();
            })
            .expect("pool open");
        }

        collect(&mut rx, 8).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.overflow_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_queue_overflows_instead_of_blocking() {
        let pool = pool(1, 1);
        let gate = Arc::new(Notify::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..3 {
            let (gate, tx) = (gate.clone(), tx.clone());
            pool.submit(async move {
                if i == 0 {
                    gate.notified().await;
                }
                tx.send(i).ok();
            })
            .expect("submission never fails while open");
        }

        assert!(pool.overflow_count() >= 1);
        gate.notify_one();
        assert_eq!(collect(&mut rx, 3).await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn panicking_job_does_not_kill_the_worker() {
        let pool = pool(1, 8);
        let (tx, mut rx) = mpsc::unbounded_channel();

        pool.submit(async { panic!("job exploded") }).expect("pool open");
        pool.submit(async move {
            tx.send(7).ok();
        })
        .expect("pool open");

        assert_eq!(collect(&mut rx, 1).await, vec![7]);
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let text = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(text.as_ref()), "static text");

        let formatted = std::panic::catch_unwind(|| panic!("node {}", 7)).unwrap_err();
        assert_eq!(panic_message(formatted.as_ref()), "node 7");

        let opaque = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(opaque.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_rejected() {
        let pool = pool(2, 8);
        pool.shutdown().await;

        assert!(pool.is_shut_down());
        assert_eq!(pool.submit(async {}), Err(QueueError::Closed));
    }
}
