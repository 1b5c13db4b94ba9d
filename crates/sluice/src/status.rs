use crossbeam_utils::CachePadded;
use portable_atomic::{AtomicU64, Ordering};

/// Lifecycle of the load coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No session is running; loads and clears are accepted.
    #[default]
    Idle,
    /// A session is dispatching or awaiting worker tasks.
    Loading,
}

/// Point-in-time view of the coordinator, as reported to the presentation
/// layer.
///
/// `rows_failed` and `rows_abandoned` carry the discrepancy between requested
/// and produced rows: a finished session always satisfies
/// `rows_produced + rows_failed + rows_abandoned == rows_requested`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadStatus {
    pub state: LoadState,
    /// Monotonic session number; `0` before the first load.
    pub session: u64,
    pub rows_requested: u64,
    pub rows_produced: u64,
    pub rows_failed: u64,
    pub rows_abandoned: u64,
    /// Time since the session started, frozen once it completes.
    pub elapsed_ms: u64,
}

impl LoadStatus {
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, LoadState::Idle)
    }

    /// Rows that were requested but never produced.
    pub const fn missing(&self) -> u64 {
        self.rows_failed + self.rows_abandoned
    }
}

/// Counters maintained by the drain loop and readable from any thread.
#[derive(Debug, Default)]
pub struct DrainStats {
    ticks: CachePadded<AtomicU64>,
    drains: CachePadded<AtomicU64>,
    rows_drained: CachePadded<AtomicU64>,
    resets: CachePadded<AtomicU64>,
}

/// Plain copy of [`DrainStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainStatsSnapshot {
    /// Ticks that passed the rate limit.
    pub ticks: u64,
    /// Ticks that took at least one item from the queue.
    pub drains: u64,
    /// Rows appended to the display sink.
    pub rows_drained: u64,
    /// Sink clears applied.
    pub resets: u64,
}

impl DrainStats {
    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drain(&self, rows: usize) {
        self.drains.fetch_add(1, Ordering::Relaxed);
        self.rows_drained.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DrainStatsSnapshot {
        DrainStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            rows_drained: self.rows_drained.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}
