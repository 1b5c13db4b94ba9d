//! Load sessions.
//!
//! A [`LoadCoordinator`] turns a load request into one generation task per
//! row, tracks how many of them produced a row, and admits at most one session
//! at a time.

mod processor;
mod session;

use crate::{
    BridgeConfig, Error, Handoff, HandoffSender, LoadStatus, RecordGenerator, Result, Summarizer,
    SystemClock, TimeSource, WorkerPool,
};
use parking_lot::Mutex;
use processor::{RowContext, feed_rows};
use session::SessionState;
use std::sync::Arc;
use tokio::{runtime::Handle, sync::watch};

/// Acknowledges an accepted load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadAccepted {
    pub session: u64,
    pub rows_requested: u64,
}

/// Starts load sessions and reports their progress.
///
/// Every request returns without waiting for row generation: dispatch and
/// completion tracking happen on a session task spawned onto the runtime the
/// coordinator was created on. Progress is observable through
/// [`status`](Self::status) or a [`subscribe`](Self::subscribe)d receiver,
/// which sees every state transition.
///
/// Loads and clears are admitted one at a time under `admission`. Only a load
/// holds the session guard past its request, so a clear never shows up as
/// `Loading` and concurrent clears all succeed.
pub struct LoadCoordinator {
    state: Arc<SessionState>,
    admission: Mutex<()>,
    pool: Arc<WorkerPool>,
    handoff: HandoffSender<Handoff>,
    summarizer: Arc<Summarizer>,
    status_tx: watch::Sender<LoadStatus>,
    runtime: Handle,
    max_rows: u64,
    fail_every: Option<u64>,
}

impl LoadCoordinator {
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: &BridgeConfig, pool: Arc<WorkerPool>, handoff: HandoffSender<Handoff>) -> Self {
        let (status_tx, _) = watch::channel(LoadStatus::default());
        Self {
            state: Arc::new(SessionState::default()),
            admission: Mutex::new(()),
            pool,
            handoff,
            summarizer: Arc::new(Summarizer::new(
                config.format.clone(),
                config.summary_max_len,
            )),
            status_tx,
            runtime: Handle::current(),
            max_rows: config.max_rows,
            fail_every: config.fail_every,
        }
    }

    /// Starts a session producing `count` rows.
    ///
    /// The sink is cleared (in-band, ahead of the new rows) and the counters
    /// reset before any row task is dispatched.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if `count` is 0 or above the configured
    ///   maximum.
    /// - [`Error::AlreadyLoading`] if a session is active. Nothing changes.
    /// - [`Error::ServiceShutdown`] if the worker pool is shutting down.
    /// - Any error from pushing the reset marker to the hand-off queue. The
    ///   previous session's status is kept as it was.
    pub fn request_load(&self, count: u64) -> Result<LoadAccepted> {
        if count == 0 || count > self.max_rows {
            return Err(Error::InvalidRequest {
                reason: format!("row count must be in 1..={}, got {count}", self.max_rows),
            });
        }
        if self.pool.is_shutdown() {
            return Err(Error::ServiceShutdown);
        }

        let admit = self.admission.lock();
        if !self.state.try_acquire() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Load of {count} rows rejected: session already active");
            return Err(Error::AlreadyLoading);
        }

        let session = self.state.next_session();
        if let Err(e) = self.handoff.push(Handoff::Reset { session }) {
            self.state.release();
            #[cfg(feature = "tracing")]
            tracing::warn!("Load of {count} rows refused: {e}");
            return Err(e);
        }
        self.state.begin(session, count);
        self.publish();
        drop(admit);

        #[cfg(feature = "tracing")]
        tracing::info!("Session {session}: loading {count} rows");

        let ctx = RowContext {
            generator: RecordGenerator::new(SystemClock.current_millis()),
            summarizer: Arc::clone(&self.summarizer),
            handoff: self.handoff.clone(),
            state: Arc::clone(&self.state),
            fail_every: self.fail_every,
        };
        self.runtime.spawn(feed_rows(
            session,
            count,
            ctx,
            Arc::clone(&self.pool),
            self.status_tx.clone(),
        ));

        Ok(LoadAccepted {
            session,
            rows_requested: count,
        })
    }

    /// Empties the display sink and zeroes the counters.
    ///
    /// The status stays `Idle` throughout.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyLoading`] while a session is active.
    /// - Any error from pushing the reset marker to the hand-off queue.
    pub fn request_clear(&self) -> Result<()> {
        let _admit = self.admission.lock();
        if self.state.is_active() {
            return Err(Error::AlreadyLoading);
        }

        let session = self.state.current_session();
        self.handoff.push(Handoff::Reset { session })?;
        self.state.reset_counters(0);
        self.publish();

        #[cfg(feature = "tracing")]
        tracing::debug!("Display cleared");
        Ok(())
    }

    pub fn status(&self) -> LoadStatus {
        self.state.snapshot()
    }

    /// A receiver notified on every state transition and periodically while
    /// loading.
    pub fn subscribe(&self) -> watch::Receiver<LoadStatus> {
        self.status_tx.subscribe()
    }

    /// Rows rejected by a bounded hand-off queue since start.
    pub fn dropped_rows(&self) -> u64 {
        self.handoff.dropped()
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.state.snapshot());
    }
}
