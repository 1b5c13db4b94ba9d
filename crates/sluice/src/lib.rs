#![doc = include_str!("../README.md")]

mod bridge;
mod config;
mod coordinator;
mod drain;
mod error;
mod pool;
mod queue;
mod record;
mod status;
mod summary;
mod time;

pub use crate::bridge::*;
pub use crate::config::*;
pub use crate::coordinator::*;
pub use crate::drain::*;
pub use crate::error::*;
pub use crate::pool::*;
pub use crate::queue::*;
pub use crate::record::*;
pub use crate::status::*;
pub use crate::summary::*;
pub use crate::time::*;
