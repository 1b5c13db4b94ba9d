use crate::{Error, FormatConfig, Result, summary::DEFAULT_SUMMARY_MAX_LEN};
use core::time::Duration;

/// Default maximum number of rows moved into the display sink per tick.
pub const DEFAULT_MAX_BATCH: usize = 1200;

/// Default minimum spacing between drain ticks (~30 Hz).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(33);

/// Default upper bound on the row count of a single load.
pub const DEFAULT_MAX_ROWS: u64 = 10_000_000;

/// Worker count for a given hardware parallelism: half the cores, at least
/// two.
///
/// ```
/// assert_eq!(sluice::workers_for(1), 2);
/// assert_eq!(sluice::workers_for(16), 8);
/// ```
pub const fn workers_for(parallelism: usize) -> usize {
    let half = parallelism / 2;
    if half < 2 { 2 } else { half }
}

/// Tuning knobs for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Number of background workers.
    pub workers: usize,
    /// Maximum rows moved into the display sink per tick.
    pub max_batch: usize,
    /// Minimum time between two drain ticks.
    pub min_tick_interval: Duration,
    /// `None` for an unbounded hand-off queue, otherwise the bounded capacity.
    pub queue_capacity: Option<usize>,
    /// Largest row count a single load may request.
    pub max_rows: u64,
    /// Maximum summary length in chars, excluding the ellipsis.
    pub summary_max_len: usize,
    pub format: FormatConfig,
    /// Deliberately fail the task of every n-th row (rows `n-1`, `2n-1`, ...).
    /// Exercises the failure accounting; `None` in normal operation.
    pub fail_every: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::with_parallelism(num_cpus::get())
    }
}

impl BridgeConfig {
    /// Default configuration sized for `parallelism` hardware threads.
    pub fn with_parallelism(parallelism: usize) -> Self {
        Self {
            workers: workers_for(parallelism),
            max_batch: DEFAULT_MAX_BATCH,
            min_tick_interval: DEFAULT_TICK_INTERVAL,
            queue_capacity: None,
            max_rows: DEFAULT_MAX_ROWS,
            summary_max_len: DEFAULT_SUMMARY_MAX_LEN,
            format: FormatConfig::default(),
            fail_every: None,
        }
    }

    /// Checks that every knob is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| -> Result<()> {
            Err(Error::InvalidRequest {
                reason: reason.to_string(),
            })
        };

        if self.workers == 0 {
            return invalid("workers must be greater than 0");
        }
        if self.max_batch == 0 {
            return invalid("max_batch must be greater than 0");
        }
        if self.min_tick_interval.is_zero() {
            return invalid("min_tick_interval must be greater than 0");
        }
        if self.queue_capacity == Some(0) {
            return invalid("queue_capacity must be greater than 0");
        }
        if self.max_rows == 0 {
            return invalid("max_rows must be greater than 0");
        }
        if self.fail_every == Some(0) {
            return invalid("fail_every must be greater than 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_has_a_floor_of_two() {
        assert_eq!(workers_for(0), 2);
        assert_eq!(workers_for(3), 2);
        assert_eq!(workers_for(4), 2);
        assert_eq!(workers_for(6), 3);
        assert_eq!(workers_for(64), 32);
    }

    #[test]
    fn defaults_validate() {
        let config = BridgeConfig::default();
        assert!(config.workers >= 2);
        assert_eq!(config.max_batch, 1200);
        assert_eq!(config.min_tick_interval, Duration::from_millis(33));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_values_are_rejected() {
        let base = BridgeConfig::with_parallelism(4);

        let mut config = base.clone();
        config.max_batch = 0;
        assert!(config.validate().is_err());

        let mut config = base.clone();
        config.queue_capacity = Some(0);
        assert!(config.validate().is_err());

        let mut config = base;
        config.min_tick_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
