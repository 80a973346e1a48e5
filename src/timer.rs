//! Performance measurement tools.

use std::{
    cell::Cell,
    fmt,
    time::{Duration, Instant},
};

const EMA_ALPHA: f32 = 0.3;

/// A timer that can measure and average the time an operation takes.
///
/// Measurements are smoothed with an exponential moving average. The average and the number of
/// measurements are reset when the timer is displayed using `{}` ([`std::fmt::Display`]).
pub struct Timer {
    name: &'static str,
    /// The current average time, in seconds. [`None`] until the first measurement.
    avg: Cell<Option<f32>>,
    /// The number of time measurements that contributed to the current `avg`.
    count: Cell<usize>,
}

impl Timer {
    /// Creates a new timer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            avg: Cell::new(None),
            count: Cell::new(0),
        }
    }

    /// Returns the name this timer was created with.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    fn record(&self, duration: Duration) {
        let secs = duration.as_secs_f32();
        let avg = match self.avg.get() {
            Some(prev) => prev + EMA_ALPHA * (secs - prev),
            None => secs,
        };
        self.avg.set(Some(avg));
        self.count.set(self.count.get() + 1);
    }
}

/// Displays the average recorded time and resets it.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let avg_ms = self.avg.take().unwrap_or(0.0) * 1000.0;
        let len = self.count.take();

        write!(f, "{}: {len}x{avg_ms:.01}ms", self.name)
    }
}

/// Cloning a timer resets its collected timings.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_resets() {
        let timer = Timer::new("op");
        assert_eq!(timer.to_string(), "op: 0x0.0ms");

        timer.record(Duration::from_millis(10));
        assert_eq!(timer.to_string(), "op: 1x10.0ms");
        assert_eq!(timer.to_string(), "op: 0x0.0ms");
    }

    #[test]
    fn averages_measurements() {
        let timer = Timer::new("op");
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(20));
        // 10 + 0.3 * (20 - 10)
        assert_eq!(timer.to_string(), "op: 2x13.0ms");
    }

    #[test]
    fn guard_records() {
        let timer = Timer::new("guard");
        let value = timer.time(|| 42);
        assert_eq!(value, 42);
        {
            let _guard = timer.start();
        }
        assert!(timer.to_string().starts_with("guard: 2x"));
    }
}
