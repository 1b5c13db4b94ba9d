use crate::Error;
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;

/// Type-erased unit of work executed by a worker. The argument is the id of
/// the worker running it.
pub(crate) type Job = Box<dyn FnOnce(usize) + Send + 'static>;

/// Final state of a submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<R> {
    /// The task ran to completion and returned a value.
    Completed(R),
    /// The task returned an error or panicked.
    Failed(Error),
    /// The pool shut down before the task ran.
    Abandoned,
}

impl<R> TaskOutcome<R> {
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Resolves to the [`TaskOutcome`] of a task submitted to the
/// [`WorkerPool`](super::WorkerPool).
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<R> {
    rx: oneshot::Receiver<TaskOutcome<R>>,
}

impl<R> TaskHandle<R> {
    pub(crate) const fn new(rx: oneshot::Receiver<TaskOutcome<R>>) -> Self {
        Self { rx }
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = TaskOutcome<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The sender only disappears without a value when the job was dropped
        // unexecuted, i.e. the worker exited with work still queued.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(TaskOutcome::Abandoned))
    }
}
