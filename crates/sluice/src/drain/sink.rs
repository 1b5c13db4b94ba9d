use crate::RenderRecord;
use tokio::sync::mpsc;

/// The presentation-side owner of the visible row collection.
///
/// A sink is only ever touched by the drain loop that owns it, so
/// implementations need not be `Send` or `Sync`: the
/// [`DisplayThread`](super::DisplayThread) constructs its sink on the display
/// thread and never hands it out.
pub trait DisplaySink {
    /// Appends one drained batch, in drain order.
    fn append(&mut self, rows: Vec<RenderRecord>);

    /// Removes every row.
    fn clear(&mut self);
}

impl<S: DisplaySink + ?Sized> DisplaySink for Box<S> {
    fn append(&mut self, rows: Vec<RenderRecord>) {
        (**self).append(rows);
    }

    fn clear(&mut self) {
        (**self).clear();
    }
}

/// In-memory row table.
#[derive(Debug, Default)]
pub struct VecSink {
    rows: Vec<RenderRecord>,
    batches: Vec<usize>,
}

impl VecSink {
    pub fn rows(&self) -> &[RenderRecord] {
        &self.rows
    }

    /// Sizes of the batches appended since the last clear.
    pub fn batch_sizes(&self) -> &[usize] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl DisplaySink for VecSink {
    fn append(&mut self, rows: Vec<RenderRecord>) {
        self.batches.push(rows.len());
        self.rows.extend(rows);
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.batches.clear();
    }
}

/// A change applied to a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Appended(Vec<RenderRecord>),
    Cleared,
}

/// Forwards every sink mutation to a subscriber channel.
///
/// This is how a presentation layer living elsewhere receives drained
/// batches: it holds the receiving end and applies the events to its own
/// state. Events are dropped silently once the subscriber goes away.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DisplaySink for ChannelSink {
    fn append(&mut self, rows: Vec<RenderRecord>) {
        let _ = self.tx.send(SinkEvent::Appended(rows));
    }

    fn clear(&mut self) {
        let _ = self.tx.send(SinkEvent::Cleared);
    }
}

/// Adapts a closure into a sink. The closure sees every [`SinkEvent`].
pub struct FnSink<F>(pub F);

impl<F> DisplaySink for FnSink<F>
where
    F: FnMut(SinkEvent),
{
    fn append(&mut self, rows: Vec<RenderRecord>) {
        (self.0)(SinkEvent::Appended(rows));
    }

    fn clear(&mut self) {
        (self.0)(SinkEvent::Cleared);
    }
}
