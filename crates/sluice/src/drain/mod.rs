//! The display side of the bridge.
//!
//! - `ticker`: the [`DrainLoop`], a rate-limited bounded consumer.
//! - `thread`: the [`DisplayThread`], the one context allowed to own a sink.
//! - `sink`: the [`DisplaySink`] capability and bundled sinks.

mod sink;
mod thread;
mod ticker;

use crate::RenderRecord;

pub use sink::{ChannelSink, DisplaySink, FnSink, SinkEvent, VecSink};
pub use thread::DisplayThread;
pub use ticker::{DrainLoop, TickOutcome};

/// An item travelling through the hand-off queue.
///
/// Sink clears travel in-band so they are ordered after every residual row of
/// earlier sessions and before every row of the session that requested them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handoff {
    Row(RenderRecord),
    Reset { session: u64 },
}
