use super::task::{Job, TaskOutcome};
use crate::{Error, Result};
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Worker task responsible for executing submitted jobs.
///
/// The worker listens on its own unbounded channel and runs jobs one at a
/// time until the shared `shutdown_token` is cancelled or every sender is
/// gone. Cancellation is observed between jobs; whatever is still queued when
/// the loop exits is dropped, which resolves the matching handles as
/// [`TaskOutcome::Abandoned`].
///
/// This function is designed to be spawned as a Tokio task.
pub async fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::UnboundedReceiver<Job>,
    shutdown_token: CancellationToken,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    loop {
        let job = tokio::select! {
            biased;
            () = shutdown_token.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");
                break;
            }
            job = rx.recv() => job,
        };

        let Some(job) = job else {
            break;
        };
        job(worker_id);

        // Jobs are CPU-bound and never await; give the scheduler a chance to
        // run other workers and observe cancellation.
        tokio::task::yield_now().await;
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped ({} queued jobs abandoned)", rx.len());
}

/// Runs `task`, turning both returned errors and panics into
/// [`TaskOutcome::Failed`]. A panicking task never takes its worker down.
#[allow(clippy::used_underscore_binding)]
pub(crate) fn run_guarded<F, R>(_worker_id: usize, task: F) -> TaskOutcome<R>
where
    F: FnOnce() -> Result<R>,
{
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(value)) => TaskOutcome::Completed(value),
        Ok(Err(_e)) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {_worker_id} task failed: {_e}");
            TaskOutcome::Failed(_e)
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            #[cfg(feature = "tracing")]
            tracing::error!("Worker {_worker_id} task panicked: {reason}");
            TaskOutcome::Failed(Error::WorkerTaskFailure {
                reason: format!("panicked: {reason}"),
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
