//! Fixed-size pool of background workers.
//!
//! This module defines the [`WorkerPool`] struct, which owns a set of Tokio
//! worker tasks, distributes jobs across them in round-robin order, and
//! supports coordinated shutdown via a shared [`CancellationToken`].
//!
//! Each worker listens on its own unbounded [`mpsc::UnboundedReceiver`], so
//! submitting never blocks and workers never contend on a shared queue.

use super::{
    task::{Job, TaskHandle},
    worker::{run_guarded, worker_loop},
};
use crate::{Error, Result};
use core::time::Duration;
use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

/// How long shutdown waits for each worker to exit.
const WORKER_EXIT_TIMEOUT: Duration = Duration::from_secs(3);

/// A pool of asynchronous workers executing CPU-bound jobs.
///
/// Jobs are distributed in round-robin fashion. Completion order across
/// workers is unspecified.
pub struct WorkerPool {
    workers: Vec<mpsc::UnboundedSender<Job>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next_worker: AtomicUsize,
    outstanding: Arc<AtomicUsize>,
    shutdown_token: CancellationToken,
}

/// Decrements the outstanding-job counter when the job runs or is dropped
/// unexecuted.
struct OutstandingGuard(Arc<AtomicUsize>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool {
    /// Spawns `num_workers` worker tasks on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn(num_workers: usize, shutdown_token: CancellationToken) -> Self {
        let num_workers = num_workers.max(1);
        let mut workers = Vec::with_capacity(num_workers);
        let mut handles = Vec::with_capacity(num_workers);

        for worker_id in 0..num_workers {
            let (tx, rx) = mpsc::unbounded_channel();
            workers.push(tx);
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                rx,
                shutdown_token.clone(),
            )));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Spawned {num_workers} workers");

        Self {
            workers,
            handles: Mutex::new(handles),
            next_worker: AtomicUsize::new(0),
            outstanding: Arc::new(AtomicUsize::new(0)),
            shutdown_token,
        }
    }

    /// Number of workers in the pool.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Jobs submitted but not yet finished or abandoned.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Returns the index of the next worker to receive work (round-robin).
    ///
    /// Uses a relaxed atomic increment to minimize contention.
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Queues `task` on the next worker and returns a handle to its outcome.
    ///
    /// Never blocks. A task that returns an error or panics resolves its
    /// handle as [`TaskOutcome::Failed`](super::TaskOutcome::Failed); the
    /// worker keeps running.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The pool is shutting down (`shutdown_token` was cancelled).
    /// - The worker's channel is closed.
    pub fn submit<F, R>(&self, task: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let (tx, rx) = oneshot::channel();
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let guard = OutstandingGuard(Arc::clone(&self.outstanding));

        let job: Job = Box::new(move |worker_id| {
            let outcome = run_guarded(worker_id, task);
            drop(guard);
            // The caller may have dropped the handle; that is not an error.
            let _ = tx.send(outcome);
        });

        let worker_idx = self.next_worker_index();
        match self.workers[worker_idx].send(job) {
            Ok(()) => Ok(TaskHandle::new(rx)),
            Err(_) => Err(Error::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            }),
        }
    }

    /// Shuts down all workers in the pool.
    ///
    /// - Cancels the shared [`CancellationToken`] so no new work is accepted
    ///   and workers stop at their next job boundary.
    /// - Waits (up to 3 seconds per worker) for each worker task to exit.
    ///
    /// Jobs still queued are abandoned. Calling this more than once is
    /// harmless.
    pub async fn shutdown(&self) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Shutting down worker pool ({} jobs outstanding)",
            self.outstanding()
        );
        self.shutdown_token.cancel();

        let handles = core::mem::take(&mut *self.handles.lock());
        let exits = handles.into_iter().enumerate().map(|(_i, handle)| async move {
            match timeout(WORKER_EXIT_TIMEOUT, handle).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} exited");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} terminated abnormally: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });
        futures::future::join_all(exits).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::TaskOutcome;
    use futures::future::join_all;
    use std::collections::HashSet;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn runs_every_submitted_task() -> Result<()> {
        let pool = WorkerPool::spawn(4, CancellationToken::new());
        assert_eq!(pool.size(), 4);

        let handles = (0..1000_u64)
            .map(|i| pool.submit(move || Ok(i * 2)))
            .collect::<Result<Vec<_>>>()?;

        let results: HashSet<_> = join_all(handles)
            .await
            .into_iter()
            .map(|outcome| match outcome {
                TaskOutcome::Completed(v) => v,
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();

        assert_eq!(results.len(), 1000);
        assert!(results.contains(&1998));
        assert_eq!(pool.outstanding(), 0);

        pool.shutdown().await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn round_robin_wraps() {
        let pool = WorkerPool::spawn(3, CancellationToken::new());
        let picks: Vec<_> = (0..6).map(|_| pool.next_worker_index()).collect();
        assert_eq!(picks, [0, 1, 2, 0, 1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn survives_panicking_tasks() -> Result<()> {
        let pool = WorkerPool::spawn(1, CancellationToken::new());

        let bad = pool.submit::<_, ()>(|| panic!("task exploded"))?;
        let good = pool.submit(|| Ok("still alive"))?;

        assert!(matches!(
            bad.await,
            TaskOutcome::Failed(Error::WorkerTaskFailure { .. })
        ));
        assert_eq!(good.await, TaskOutcome::Completed("still alive"));

        pool.shutdown().await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_after_shutdown_is_rejected() -> Result<()> {
        let pool = WorkerPool::spawn(2, CancellationToken::new());
        pool.shutdown().await?;
        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.submit(|| Ok(())),
            Err(Error::ServiceShutdown)
        ));
        // A second shutdown is a no-op.
        pool.shutdown().await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn queued_tasks_are_abandoned_on_shutdown() -> Result<()> {
        let pool = WorkerPool::spawn(1, CancellationToken::new());
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        // Park the only worker so the remaining jobs stay queued.
        let blocker = pool.submit(move || {
            let _ = started_tx.send(());
            let _ = release_rx.recv();
            Ok(())
        })?;
        let queued = (0..10)
            .map(|_| pool.submit(|| Ok(())))
            .collect::<Result<Vec<_>>>()?;

        started_rx.await.unwrap();
        pool.shutdown_token.cancel();
        release_tx.send(()).unwrap();
        pool.shutdown().await?;

        assert_eq!(blocker.await, TaskOutcome::Completed(()));
        for handle in queued {
            assert_eq!(handle.await, TaskOutcome::Abandoned);
        }
        assert_eq!(pool.outstanding(), 0);
        Ok(())
    }
}
