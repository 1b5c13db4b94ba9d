//! The hand-off queue between background workers and the display context.
//!
//! [`HandoffQueue`] builds a multi-producer / single-consumer pair on top of
//! Tokio's lock-free MPSC channels. Producers push without blocking and never
//! contend on a shared lock; the single consumer takes bounded batches with
//! [`HandoffReceiver::drain`]. Single-consumer access is enforced by
//! ownership: `drain` needs `&mut self` and the receiver is not `Clone`.
//!
//! Two capacity policies are available:
//!
//! - [`HandoffQueue::unbounded`]: `push` always succeeds.
//! - [`HandoffQueue::bounded`]: `push` fails with [`Error::QueueFull`] once
//!   `capacity` items are waiting, and the rejected item is counted as dropped.

use crate::{Error, Result};
use crossbeam_utils::CachePadded;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// Constructor namespace for hand-off queue pairs.
pub struct HandoffQueue;

impl HandoffQueue {
    /// Creates an unbounded queue.
    pub fn unbounded<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        Self::pair(SenderKind::Unbounded(tx), ReceiverKind::Unbounded(rx))
    }

    /// Creates a queue holding at most `capacity` items. `capacity` must be
    /// non-zero.
    pub fn bounded<T>(capacity: usize) -> Result<(HandoffSender<T>, HandoffReceiver<T>)> {
        if capacity == 0 {
            return Err(Error::InvalidRequest {
                reason: "Queue capacity must be greater than 0".to_string(),
            });
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok(Self::pair(
            SenderKind::Bounded { tx, capacity },
            ReceiverKind::Bounded(rx),
        ))
    }

    /// Creates a queue with the given capacity policy; `None` is unbounded.
    pub fn with_capacity<T>(
        capacity: Option<usize>,
    ) -> Result<(HandoffSender<T>, HandoffReceiver<T>)> {
        match capacity {
            Some(capacity) => Self::bounded(capacity),
            None => Ok(Self::unbounded()),
        }
    }

    fn pair<T>(tx: SenderKind<T>, rx: ReceiverKind<T>) -> (HandoffSender<T>, HandoffReceiver<T>) {
        let dropped = Arc::new(CachePadded::new(AtomicU64::new(0)));
        (
            HandoffSender {
                inner: tx,
                dropped: Arc::clone(&dropped),
            },
            HandoffReceiver { inner: rx, dropped },
        )
    }
}

enum SenderKind<T> {
    Unbounded(mpsc::UnboundedSender<T>),
    Bounded { tx: mpsc::Sender<T>, capacity: usize },
}

impl<T> Clone for SenderKind<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
            Self::Bounded { tx, capacity } => Self::Bounded {
                tx: tx.clone(),
                capacity: *capacity,
            },
        }
    }
}

/// Producer half of the hand-off queue. Cheap to clone; one per worker task
/// is fine.
pub struct HandoffSender<T> {
    inner: SenderKind<T>,
    dropped: Arc<CachePadded<AtomicU64>>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> HandoffSender<T> {
    /// Enqueues `item` without blocking.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueFull`] if the queue is bounded and at capacity. The item
    ///   is dropped and counted in [`dropped`](Self::dropped).
    /// - [`Error::ChannelError`] if the receiver no longer exists.
    pub fn push(&self, item: T) -> Result<()> {
        match &self.inner {
            SenderKind::Unbounded(tx) => tx.send(item).map_err(|_| Error::ChannelError {
                context: "Hand-off receiver dropped".to_string(),
            }),
            SenderKind::Bounded { tx, capacity } => match tx.try_send(item) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    Err(Error::QueueFull {
                        capacity: *capacity,
                    })
                }
                Err(TrySendError::Closed(_)) => Err(Error::ChannelError {
                    context: "Hand-off receiver dropped".to_string(),
                }),
            },
        }
    }

    /// Number of items rejected because the bounded queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns `None` for an unbounded queue.
    pub const fn capacity(&self) -> Option<usize> {
        match &self.inner {
            SenderKind::Unbounded(_) => None,
            SenderKind::Bounded { capacity, .. } => Some(*capacity),
        }
    }
}

enum ReceiverKind<T> {
    Unbounded(mpsc::UnboundedReceiver<T>),
    Bounded(mpsc::Receiver<T>),
}

/// Consumer half of the hand-off queue.
pub struct HandoffReceiver<T> {
    inner: ReceiverKind<T>,
    dropped: Arc<CachePadded<AtomicU64>>,
}

impl<T> HandoffReceiver<T> {
    /// Number of items currently waiting.
    pub fn len(&self) -> usize {
        match &self.inner {
            ReceiverKind::Unbounded(rx) => rx.len(),
            ReceiverKind::Bounded(rx) => rx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items rejected because the bounded queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn try_recv(&mut self) -> Option<T> {
        let res = match &mut self.inner {
            ReceiverKind::Unbounded(rx) => rx.try_recv(),
            ReceiverKind::Bounded(rx) => rx.try_recv(),
        };
        match res {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Removes up to `max` items in queue order.
    ///
    /// Items pushed while the drain runs may or may not be included; no item
    /// is returned twice or lost. When nothing is waiting the returned `Vec`
    /// is empty and does not allocate.
    pub fn drain(&mut self, max: usize) -> Vec<T> {
        let available = self.len();
        if available == 0 || max == 0 {
            return Vec::new();
        }

        let mut batch = Vec::with_capacity(available.min(max));
        while batch.len() < max {
            match self.try_recv() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn drain_respects_cap_and_order() {
        let (tx, mut rx) = HandoffQueue::unbounded();
        for i in 0..5 {
            tx.push(i).unwrap();
        }

        assert_eq!(rx.drain(2), vec![0, 1]);
        assert_eq!(rx.drain(2), vec![2, 3]);
        assert_eq!(rx.drain(2), vec![4]);

        let empty = rx.drain(2);
        assert!(empty.is_empty());
        assert_eq!(empty.capacity(), 0);
    }

    #[test]
    fn drain_with_zero_cap_takes_nothing() {
        let (tx, mut rx) = HandoffQueue::unbounded();
        tx.push(1).unwrap();
        assert!(rx.drain(0).is_empty());
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn bounded_queue_drops_when_full() {
        let (tx, mut rx) = HandoffQueue::bounded(2).unwrap();
        tx.push('a').unwrap();
        tx.push('b').unwrap();
        assert_eq!(tx.push('c'), Err(Error::QueueFull { capacity: 2 }));
        assert_eq!(tx.dropped(), 1);
        assert_eq!(rx.dropped(), 1);

        assert_eq!(rx.drain(10), vec!['a', 'b']);
        tx.push('d').unwrap();
        assert_eq!(rx.drain(10), vec!['d']);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            HandoffQueue::bounded::<u8>(0),
            Err(Error::InvalidRequest { .. })
        ));
    }

    #[test]
    fn push_after_receiver_dropped_is_a_channel_error() {
        let (tx, rx) = HandoffQueue::unbounded();
        drop(rx);
        assert!(matches!(tx.push(1), Err(Error::ChannelError { .. })));
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        const PRODUCERS: u64 = 8;
        const PER_PRODUCER: u64 = 2_000;

        let (tx, mut rx) = HandoffQueue::unbounded();
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        tx.push(p * PER_PRODUCER + i).unwrap();
                    }
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut remaining = PRODUCERS * PER_PRODUCER;
        while remaining > 0 {
            for item in rx.drain(64) {
                assert!(seen.insert(item), "duplicate item {item}");
                remaining -= 1;
            }
            std::thread::yield_now();
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(rx.drain(64).is_empty());
        assert_eq!(seen.len() as u64, PRODUCERS * PER_PRODUCER);
    }
}
