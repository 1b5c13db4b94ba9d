use crate::{LoadState, LoadStatus, MonotonicClock, TimeSource};
use crossbeam_utils::CachePadded;
use portable_atomic::{AtomicBool, AtomicU64, Ordering};

/// Bookkeeping for the current (or most recent) load session.
///
/// `active` is the single-flight guard: only a successful compare-and-set
/// from `false` to `true` may start a load or a clear. `produced` is bumped by
/// workers and padded to keep it off the guard's cache line.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    active: AtomicBool,
    session: AtomicU64,
    requested: AtomicU64,
    produced: CachePadded<AtomicU64>,
    failed: AtomicU64,
    abandoned: AtomicU64,
    started_ms: AtomicU64,
    elapsed_ms: AtomicU64,
    clock: MonotonicClock,
}

impl SessionState {
    /// Attempts the `Idle -> Loading` transition.
    pub(crate) fn try_acquire(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn current_session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    /// The number the next session will carry. Nothing is reserved.
    pub(crate) fn next_session(&self) -> u64 {
        self.current_session() + 1
    }

    /// Makes `session` current and resets the counters for it. Only called
    /// while holding the guard.
    pub(crate) fn begin(&self, session: u64, requested: u64) {
        self.reset_counters(requested);
        self.started_ms
            .store(self.clock.current_millis(), Ordering::Release);
        self.session.store(session, Ordering::Release);
    }

    /// Freezes the elapsed time of the finished session.
    pub(crate) fn finish(&self) -> u64 {
        let elapsed = self.running_elapsed();
        self.elapsed_ms.store(elapsed, Ordering::Release);
        elapsed
    }

    /// Zeroes every counter. Only called while holding the guard.
    pub(crate) fn reset_counters(&self, requested: u64) {
        self.requested.store(requested, Ordering::Release);
        self.produced.store(0, Ordering::Release);
        self.failed.store(0, Ordering::Release);
        self.abandoned.store(0, Ordering::Release);
        self.elapsed_ms.store(0, Ordering::Release);
    }

    pub(crate) fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_abandoned(&self, rows: u64) {
        self.abandoned.fetch_add(rows, Ordering::AcqRel);
    }

    fn running_elapsed(&self) -> u64 {
        self.clock
            .current_millis()
            .saturating_sub(self.started_ms.load(Ordering::Acquire))
    }

    pub(crate) fn snapshot(&self) -> LoadStatus {
        let active = self.is_active();
        LoadStatus {
            state: if active {
                LoadState::Loading
            } else {
                LoadState::Idle
            },
            session: self.session.load(Ordering::Acquire),
            rows_requested: self.requested.load(Ordering::Acquire),
            rows_produced: self.produced.load(Ordering::Acquire),
            rows_failed: self.failed.load(Ordering::Acquire),
            rows_abandoned: self.abandoned.load(Ordering::Acquire),
            elapsed_ms: if active {
                self.running_elapsed()
            } else {
                self.elapsed_ms.load(Ordering::Acquire)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_admits_one_holder() {
        let state = SessionState::default();
        assert!(state.try_acquire());
        assert!(!state.try_acquire());
        assert_eq!(state.snapshot().state, LoadState::Loading);

        state.release();
        assert!(state.try_acquire());
    }

    #[test]
    fn begin_numbers_sessions_and_resets_counters() {
        let state = SessionState::default();
        assert_eq!(state.next_session(), 1);
        assert_eq!(state.next_session(), 1);
        state.begin(state.next_session(), 10);
        state.record_produced();
        state.record_failed();
        state.record_abandoned(3);

        let status = state.snapshot();
        assert_eq!(
            (status.rows_requested, status.rows_produced, status.rows_failed, status.rows_abandoned),
            (10, 1, 1, 3)
        );

        state.begin(state.next_session(), 5);
        let status = state.snapshot();
        assert_eq!(status.session, 2);
        assert_eq!((status.rows_requested, status.rows_produced, status.missing()), (5, 0, 0));
    }
}
