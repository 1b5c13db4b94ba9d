use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A trait for time sources that return a monotonic or wall-clock timestamp
/// in milliseconds.
///
/// This abstraction allows you to plug in the system clock, a monotonic
/// timer, or a mocked time source in tests. The drain loop uses it to rate
/// limit ticks and the coordinator uses it to time sessions.
///
/// # Example
///
/// ```
/// use sluice::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// let time = FixedTime;
/// assert_eq!(time.current_millis(), 1234);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the source's origin.
    fn current_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

/// Wall-clock time as milliseconds since the Unix epoch.
///
/// Used to anchor the timestamps of generated records. Returns `0` if the
/// system clock reports a time before the epoch.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A monotonic time source that returns elapsed milliseconds since
/// construction.
///
/// This avoids wall-clock adjustments (e.g., NTP or daylight savings changes)
/// so interval checks and elapsed-time reports never go backward.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl TimeSource for MonotonicClock {
    fn current_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn monotonic_clock_never_goes_backward() {
        let clock = MonotonicClock::default();
        let mut last = clock.current_millis();
        for _ in 0..5 {
            std::thread::sleep(Duration::from_millis(1));
            let now = clock.current_millis();
            assert!(now >= last);
            last = now;
        }
        assert!(last >= 5);
    }

    #[test]
    fn system_clock_is_after_2025() {
        // Wednesday, January 1, 2025 00:00:00 UTC
        assert!(SystemClock.current_millis() > 1_735_689_600_000);
    }
}
