use super::{DisplaySink, Handoff};
use crate::{DrainStats, HandoffReceiver, TimeSource};
use core::time::Duration;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Result of a single [`DrainLoop::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Less than the minimum interval elapsed since the previous tick.
    Throttled,
    /// The queue was empty.
    Idle,
    /// Items were taken from the queue.
    Drained { rows: usize, resets: usize },
}

/// The single consumer of the hand-off queue and sole owner of the display
/// sink.
///
/// Each tick moves at most `max_batch` queue items into the sink with a single
/// `append`, bounding the per-tick cost on the display context no matter how
/// deep the queue gets. Rows may wait several ticks; that latency is the price
/// of the bound.
pub struct DrainLoop<S, C> {
    rx: HandoffReceiver<Handoff>,
    sink: S,
    clock: C,
    max_batch: usize,
    min_interval_ms: u64,
    last_tick: Option<u64>,
    stats: Arc<DrainStats>,
}

impl<S, C> DrainLoop<S, C>
where
    S: DisplaySink,
    C: TimeSource,
{
    pub fn new(
        rx: HandoffReceiver<Handoff>,
        sink: S,
        clock: C,
        max_batch: usize,
        min_interval: Duration,
        stats: Arc<DrainStats>,
    ) -> Self {
        Self {
            rx,
            sink,
            clock,
            max_batch: max_batch.max(1),
            min_interval_ms: min_interval.as_millis() as u64,
            last_tick: None,
            stats,
        }
    }

    pub const fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> &DrainStats {
        &self.stats
    }

    /// Items still waiting in the hand-off queue.
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }

    /// Performs one rate-limited, bounded drain.
    ///
    /// A [`Handoff::Reset`] clears the sink in place; rows taken before it in
    /// the same batch belong to an earlier session and are discarded along
    /// with the rest of the sink.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.current_millis();
        if let Some(last) = self.last_tick {
            if now.saturating_sub(last) < self.min_interval_ms {
                return TickOutcome::Throttled;
            }
        }
        self.last_tick = Some(now);
        self.stats.record_tick();

        let batch = self.rx.drain(self.max_batch);
        if batch.is_empty() {
            return TickOutcome::Idle;
        }

        let mut rows = Vec::with_capacity(batch.len());
        let mut resets = 0;
        for item in batch {
            match item {
                Handoff::Row(row) => rows.push(row),
                Handoff::Reset { session: _session } => {
                    rows.clear();
                    self.sink.clear();
                    self.stats.record_reset();
                    resets += 1;

                    #[cfg(feature = "tracing")]
                    tracing::debug!("Display sink cleared for session {_session}");
                }
            }
        }

        let appended = rows.len();
        if appended > 0 {
            self.sink.append(rows);
        }
        self.stats.record_drain(appended);

        TickOutcome::Drained {
            rows: appended,
            resets,
        }
    }

    /// Ticks twice per `min_interval` until `token` is cancelled, then returns
    /// the sink. [`tick`](Self::tick) enforces the interval itself, so a late
    /// wake-up delays the next drain by at most half an interval.
    ///
    /// Cancellation stops issuing ticks; it never interrupts one.
    pub async fn run(mut self, token: CancellationToken) -> S {
        let period =
            (Duration::from_millis(self.min_interval_ms) / 2).max(Duration::from_millis(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Drain loop stopped with {} items queued", self.backlog());

        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HandoffQueue, HandoffSender, RenderRecord, VecSink};
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;

    struct MockTime {
        millis: Rc<Cell<u64>>,
    }

    impl TimeSource for MockTime {
        fn current_millis(&self) -> u64 {
            self.millis.get()
        }
    }

    fn row(id: u64) -> Handoff {
        Handoff::Row(RenderRecord {
            id,
            timestamp_text: String::new(),
            amount_text: String::new(),
            customer_text: String::new(),
            summary_text: String::new(),
        })
    }

    fn setup(max_batch: usize) -> (HandoffSender<Handoff>, DrainLoop<VecSink, MockTime>, Rc<Cell<u64>>) {
        let (tx, rx) = HandoffQueue::unbounded();
        let millis = Rc::new(Cell::new(1_000));
        let drain = DrainLoop::new(
            rx,
            VecSink::default(),
            MockTime {
                millis: Rc::clone(&millis),
            },
            max_batch,
            Duration::from_millis(33),
            Arc::new(DrainStats::default()),
        );
        (tx, drain, millis)
    }

    #[test]
    fn drains_in_bounded_batches() {
        let (tx, mut drain, millis) = setup(2);
        for id in 0..5 {
            tx.push(row(id)).unwrap();
        }

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(drain.tick());
            millis.set(millis.get() + 33);
        }

        assert_eq!(
            outcomes,
            [
                TickOutcome::Drained { rows: 2, resets: 0 },
                TickOutcome::Drained { rows: 2, resets: 0 },
                TickOutcome::Drained { rows: 1, resets: 0 },
                TickOutcome::Idle,
            ]
        );
        assert_eq!(drain.sink().batch_sizes(), [2, 2, 1]);
        let ids: Vec<_> = drain.sink().rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn drain_count_is_ceil_of_depth_over_cap() {
        for (depth, cap) in [(0_u64, 7), (1, 7), (7, 7), (8, 7), (1000, 33), (1200, 1200)] {
            let (tx, mut drain, millis) = setup(cap);
            for id in 0..depth {
                tx.push(row(id)).unwrap();
            }

            while drain.backlog() > 0 {
                drain.tick();
                millis.set(millis.get() + 33);
            }
            // Further ticks on an empty queue are no-ops.
            for _ in 0..3 {
                assert_eq!(drain.tick(), TickOutcome::Idle);
                millis.set(millis.get() + 33);
            }

            let stats = drain.stats().snapshot();
            assert_eq!(stats.drains, depth.div_ceil(cap as u64), "depth {depth} cap {cap}");
            assert_eq!(stats.rows_drained, depth);
            assert_eq!(drain.sink().len() as u64, depth);
        }
    }

    #[test]
    fn ticks_closer_than_the_interval_are_throttled() {
        let (tx, mut drain, millis) = setup(10);
        tx.push(row(1)).unwrap();

        assert_eq!(drain.tick(), TickOutcome::Drained { rows: 1, resets: 0 });
        tx.push(row(2)).unwrap();

        millis.set(millis.get() + 32);
        assert_eq!(drain.tick(), TickOutcome::Throttled);
        assert_eq!(drain.backlog(), 1);

        millis.set(millis.get() + 1);
        assert_eq!(drain.tick(), TickOutcome::Drained { rows: 1, resets: 0 });
        assert_eq!(drain.stats().snapshot().ticks, 2);
    }

    #[test]
    fn reset_discards_earlier_rows() {
        let (tx, mut drain, millis) = setup(100);
        tx.push(row(1)).unwrap();
        tx.push(row(2)).unwrap();
        assert!(matches!(drain.tick(), TickOutcome::Drained { rows: 2, .. }));
        millis.set(millis.get() + 33);

        tx.push(row(3)).unwrap();
        tx.push(Handoff::Reset { session: 2 }).unwrap();
        tx.push(row(10)).unwrap();
        tx.push(row(11)).unwrap();

        assert_eq!(drain.tick(), TickOutcome::Drained { rows: 2, resets: 1 });
        let ids: HashSet<_> = drain.sink().rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, HashSet::from([10, 11]));
        assert_eq!(drain.stats().snapshot().resets, 1);
    }

    /// Tokio time as seen by a display context that wakes up 5 ms late in
    /// every other interval.
    struct LateEveryOtherFrame {
        start: tokio::time::Instant,
    }

    impl TimeSource for LateEveryOtherFrame {
        fn current_millis(&self) -> u64 {
            let ms = self.start.elapsed().as_millis() as u64;
            if (ms / 33) % 2 == 1 { ms + 5 } else { ms }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_ticks_do_not_skip_whole_intervals() {
        let (tx, rx) = HandoffQueue::unbounded();
        for id in 0..200 {
            tx.push(row(id)).unwrap();
        }
        let stats = Arc::new(DrainStats::default());
        let drain = DrainLoop::new(
            rx,
            VecSink::default(),
            LateEveryOtherFrame {
                start: tokio::time::Instant::now(),
            },
            1,
            Duration::from_millis(33),
            Arc::clone(&stats),
        );

        let token = CancellationToken::new();
        let stop = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(990)).await;
            stop.cancel();
        });
        let sink = drain.run(token).await;

        // A timer firing once per interval drains only about 16 times here.
        let drains = stats.snapshot().drains;
        assert!(drains >= 20, "only {drains} drains in 990 ms");
        assert!(drains <= 31, "{drains} drains in 990 ms");
        assert_eq!(sink.len() as u64, drains);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_drains_until_cancelled_and_returns_the_sink() {
        let (tx, rx) = HandoffQueue::unbounded();
        let stats = Arc::new(DrainStats::default());
        let drain = DrainLoop::new(
            rx,
            VecSink::default(),
            crate::MonotonicClock::default(),
            4,
            Duration::from_millis(1),
            Arc::clone(&stats),
        );
        for id in 0..10 {
            tx.push(row(id)).unwrap();
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(drain.run(token.clone()));
        tokio::time::timeout(Duration::from_secs(5), async {
            while stats.snapshot().rows_drained < 10 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("drain loop made no progress");

        token.cancel();
        let sink = task.await.unwrap();
        assert_eq!(sink.len(), 10);
        assert!(sink.batch_sizes().iter().all(|&n| n <= 4));
        assert!(stats.snapshot().drains >= 3);
    }
}
