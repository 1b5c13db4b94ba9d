use crate::{
    BridgeConfig, DisplaySink, DisplayThread, DrainStatsSnapshot, HandoffQueue, LoadAccepted,
    LoadCoordinator, LoadStatus, Result, WorkerPool,
};
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// How long [`Bridge::shutdown`] waits for an interrupted session to settle.
const SESSION_SETTLE_TIMEOUT: Duration = Duration::from_secs(3);

/// The assembled pipeline: worker pool, load coordinator, hand-off queue and
/// display thread.
///
/// ```no_run
/// use sluice::{Bridge, BridgeConfig, VecSink};
///
/// # async fn demo() -> sluice::Result<()> {
/// let bridge = Bridge::start(BridgeConfig::default(), VecSink::default)?;
/// bridge.request_load(60_000)?;
///
/// let mut status = bridge.subscribe();
/// let _ = status.wait_for(|s| s.is_idle()).await;
/// bridge.shutdown().await
/// # }
/// ```
pub struct Bridge {
    coordinator: LoadCoordinator,
    pool: Arc<WorkerPool>,
    display: DisplayThread,
    token: CancellationToken,
}

impl Bridge {
    /// Validates `config` and starts every component. `make_sink` runs on the
    /// display thread.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the display thread cannot be
    /// spawned.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start<S, F>(config: BridgeConfig, make_sink: F) -> Result<Self>
    where
        S: DisplaySink + 'static,
        F: FnOnce() -> S + Send + 'static,
    {
        config.validate()?;

        let token = CancellationToken::new();
        let (tx, rx) = HandoffQueue::with_capacity(config.queue_capacity)?;
        let pool = Arc::new(WorkerPool::spawn(config.workers, token.child_token()));
        let display = DisplayThread::spawn(
            rx,
            make_sink,
            config.max_batch,
            config.min_tick_interval,
            token.child_token(),
        )?;
        let coordinator = LoadCoordinator::new(&config, Arc::clone(&pool), tx);

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Bridge started: {} workers, batch {}, tick {:?}, queue {}",
            config.workers,
            config.max_batch,
            config.min_tick_interval,
            config
                .queue_capacity
                .map_or_else(|| "unbounded".to_string(), |c| c.to_string())
        );

        Ok(Self {
            coordinator,
            pool,
            display,
            token,
        })
    }

    /// See [`LoadCoordinator::request_load`].
    pub fn request_load(&self, count: u64) -> Result<LoadAccepted> {
        self.coordinator.request_load(count)
    }

    /// See [`LoadCoordinator::request_clear`].
    pub fn request_clear(&self) -> Result<()> {
        self.coordinator.request_clear()
    }

    pub fn status(&self) -> LoadStatus {
        self.coordinator.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadStatus> {
        self.coordinator.subscribe()
    }

    pub fn drain_stats(&self) -> DrainStatsSnapshot {
        self.display.stats().snapshot()
    }

    /// See [`LoadCoordinator::dropped_rows`].
    pub fn dropped_rows(&self) -> u64 {
        self.coordinator.dropped_rows()
    }

    /// Stops the pipeline.
    ///
    /// Queued row tasks are abandoned, the active session (if any) is allowed
    /// to settle, and the display thread stops after its current tick. Rows
    /// still in the hand-off queue are discarded.
    pub async fn shutdown(mut self) -> Result<()> {
        self.pool.shutdown().await?;

        let mut status = self.coordinator.subscribe();
        if tokio::time::timeout(SESSION_SETTLE_TIMEOUT, status.wait_for(LoadStatus::is_idle))
            .await
            .is_err()
        {
            #[cfg(feature = "tracing")]
            tracing::warn!("Session did not settle before shutdown");
        }

        self.token.cancel();
        self.display.shutdown().await
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        // Workers and the drain loop are children of this token.
        self.token.cancel();
    }
}
