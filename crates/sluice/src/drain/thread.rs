use super::{DisplaySink, DrainLoop, Handoff};
use crate::{DrainStats, Error, HandoffReceiver, MonotonicClock, Result};
use core::time::Duration;
use std::{sync::Arc, thread};
use tokio_util::sync::CancellationToken;

/// The dedicated display context.
///
/// Owns an OS thread running a current-thread Tokio runtime that drives a
/// [`DrainLoop`]. The sink is built *on* that thread by the `make_sink`
/// factory and never leaves it, so no other context can mutate it.
pub struct DisplayThread {
    handle: Option<thread::JoinHandle<()>>,
    token: CancellationToken,
    stats: Arc<DrainStats>,
}

impl DisplayThread {
    /// Starts the display thread.
    ///
    /// The drain loop stops when `token` (or a child of it) is cancelled or
    /// [`shutdown`](Self::shutdown) is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] if the OS refuses to spawn the thread.
    pub fn spawn<S, F>(
        rx: HandoffReceiver<Handoff>,
        make_sink: F,
        max_batch: usize,
        min_interval: Duration,
        token: CancellationToken,
    ) -> Result<Self>
    where
        S: DisplaySink + 'static,
        F: FnOnce() -> S + Send + 'static,
    {
        let stats = Arc::new(DrainStats::default());
        let thread_stats = Arc::clone(&stats);
        let thread_token = token.clone();

        let handle = thread::Builder::new()
            .name("sluice-display".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(_e) => {
                        #[cfg(feature = "tracing")]
                        tracing::error!("Failed to build display runtime: {_e}");
                        return;
                    }
                };

                let drain = DrainLoop::new(
                    rx,
                    make_sink(),
                    MonotonicClock::default(),
                    max_batch,
                    min_interval,
                    thread_stats,
                );

                #[cfg(feature = "tracing")]
                tracing::debug!("Display thread started");

                runtime.block_on(drain.run(thread_token));
            })
            .map_err(|e| Error::ChannelError {
                context: format!("Failed to spawn display thread: {e}"),
            })?;

        Ok(Self {
            handle: Some(handle),
            token,
            stats,
        })
    }

    /// Counters maintained by the drain loop.
    pub fn stats(&self) -> Arc<DrainStats> {
        Arc::clone(&self.stats)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops issuing ticks and waits for the thread to exit. Safe to call more
    /// than once.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.token.cancel();
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::ChannelError {
                context: "Display thread panicked".to_string(),
            }),
            Err(e) => Err(Error::ChannelError {
                context: format!("Failed to join display thread: {e}"),
            }),
        }
    }
}

impl Drop for DisplayThread {
    fn drop(&mut self) {
        // Detach rather than block; the loop exits at its next tick.
        self.token.cancel();
    }
}
