//! Background execution for generation and summarization tasks.
//!
//! - `manager`: the [`WorkerPool`] (spawn, round-robin submit, shutdown).
//! - `worker`: the per-worker loop and panic isolation.
//! - `task`: [`TaskHandle`] and [`TaskOutcome`].

mod manager;
mod task;
mod worker;

pub use manager::WorkerPool;
pub use task::{TaskHandle, TaskOutcome};
