use super::session::SessionState;
use crate::{
    Error, Handoff, HandoffSender, RecordGenerator, Result, Summarizer, TaskOutcome, WorkerPool,
};
use futures::{FutureExt, StreamExt, stream::FuturesUnordered};
use std::sync::Arc;
use tokio::sync::watch;

/// How many resolved tasks pass between two progress publications.
const PROGRESS_EVERY: u64 = 1024;

/// Row tasks submitted but not yet resolved, per session.
pub(crate) const MAX_IN_FLIGHT: usize = 4096;

/// Everything a row task needs, cloned once per session.
#[derive(Clone)]
pub(crate) struct RowContext {
    pub(crate) generator: RecordGenerator,
    pub(crate) summarizer: Arc<Summarizer>,
    pub(crate) handoff: HandoffSender<Handoff>,
    pub(crate) state: Arc<SessionState>,
    pub(crate) fail_every: Option<u64>,
}

impl RowContext {
    /// Generates, summarizes and hands off row `id`.
    ///
    /// Runs on a worker. `produced` is only counted once the row is in the
    /// queue, so a rejected push shows up as a failed row.
    pub(crate) fn process(&self, id: u64) -> Result<()> {
        if let Some(every) = self.fail_every {
            if (id + 1) % every == 0 {
                return Err(Error::WorkerTaskFailure {
                    reason: format!("injected failure for row {id}"),
                });
            }
        }

        let raw = self.generator.generate(id);
        let row = self.summarizer.summarize_record(raw);
        self.handoff.push(Handoff::Row(row))?;
        self.state.record_produced();
        Ok(())
    }
}

/// Feeds `count` row tasks to the pool, keeping at most [`MAX_IN_FLIGHT`]
/// unresolved, and waits for every one of them before releasing the session
/// guard.
///
/// Tasks that cannot be submitted (the pool is shutting down) are counted as
/// abandoned along with every task after them. The guard is released on every
/// path, so a session can never stay active forever.
pub(crate) async fn feed_rows(
    _session: u64,
    count: u64,
    ctx: RowContext,
    pool: Arc<WorkerPool>,
    status_tx: watch::Sender<crate::LoadStatus>,
) {
    let state = Arc::clone(&ctx.state);
    let mut pending = FuturesUnordered::new();
    let mut next = 0_u64;
    let mut resolved = 0_u64;

    loop {
        while next < count && pending.len() < MAX_IN_FLIGHT {
            let id = next;
            let row_ctx = ctx.clone();
            match pool.submit(move || row_ctx.process(id)) {
                Ok(handle) => {
                    pending.push(handle.map(move |outcome| (id, outcome)));
                    next += 1;
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Session {_session}: dispatch stopped at row {id}: {_e}");
                    state.record_abandoned(count - id);
                    next = count;
                }
            }
        }

        let Some((_id, outcome)) = pending.next().await else {
            break;
        };
        match outcome {
            TaskOutcome::Completed(()) => {}
            TaskOutcome::Failed(_e) => {
                state.record_failed();
                #[cfg(feature = "tracing")]
                tracing::debug!("Session {_session}: row {_id} failed: {_e}");
            }
            TaskOutcome::Abandoned => state.record_abandoned(1),
        }

        resolved += 1;
        if resolved % PROGRESS_EVERY == 0 {
            status_tx.send_replace(state.snapshot());
        }
    }
    drop(ctx);

    let _elapsed = state.finish();
    state.release();
    let status = state.snapshot();
    status_tx.send_replace(status);

    #[cfg(feature = "tracing")]
    {
        tracing::info!(
            "Session {_session}: loaded {} of {} rows in ~{_elapsed} ms",
            status.rows_produced,
            status.rows_requested
        );
        if status.missing() > 0 {
            tracing::warn!(
                "Session {_session}: {} rows failed, {} abandoned",
                status.rows_failed,
                status.rows_abandoned
            );
        }
    }
}
