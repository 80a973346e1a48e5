//! Frame rate estimation.
//!
//! [`FrameRateEstimator`] counts frames in fixed one-second windows. When a window completes, the
//! rate is the number of frames counted divided by the exact time that elapsed, and that value is
//! kept until the next window completes.

use std::time::{Duration, Instant};

/// Length of a measurement window.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Computes frames per second over consecutive [`REPORT_INTERVAL`] windows.
///
/// Timestamps are passed in explicitly, so the estimator never reads the clock itself. A timestamp
/// that lies before the start of the current window counts the frame, but can never complete the
/// window.
#[derive(Debug, Clone)]
pub struct FrameRateEstimator {
    window_start: Instant,
    frame_count: u32,
    last_rate: Option<f64>,
}

impl FrameRateEstimator {
    /// Creates an estimator whose first window starts at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frame_count: 0,
            last_rate: None,
        }
    }

    /// Records a processed frame at time `now`.
    ///
    /// Returns the new rate if this frame completed a window, and [`None`] otherwise.
    pub fn on_frame_processed(&mut self, now: Instant) -> Option<f64> {
        self.frame_count += 1;

        // Saturates to zero when `now` is before `window_start`.
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < REPORT_INTERVAL {
            return None;
        }

        let rate = f64::from(self.frame_count) / elapsed.as_secs_f64();
        self.last_rate = Some(rate);
        self.frame_count = 0;
        self.window_start = now;
        Some(rate)
    }

    /// Returns the rate of the most recently completed window.
    ///
    /// This is [`None`] until the first window has completed.
    #[inline]
    pub fn current_rate(&self) -> Option<f64> {
        self.last_rate
    }

    /// Returns the number of frames counted in the current window.
    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Returns the time at which the current window started.
    #[inline]
    pub fn window_start(&self) -> Instant {
        self.window_start
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    #[test]
    fn undefined_before_first_window() {
        let t0 = Instant::now();
        let mut est = FrameRateEstimator::new(t0);
        assert_eq!(est.current_rate(), None);

        assert_eq!(est.on_frame_processed(t0), None);
        assert_eq!(est.current_rate(), None);
        assert_eq!(est.frame_count(), 1);
    }

    #[test]
    fn short_bursts_stay_undefined() {
        let t0 = Instant::now();
        let mut est = FrameRateEstimator::new(t0);
        for i in 0..9 {
            est.on_frame_processed(at(t0, i as f64 * 0.1));
        }
        assert_eq!(est.current_rate(), None);
        assert_eq!(est.frame_count(), 9);
        assert_eq!(est.window_start(), t0);
    }

    #[test]
    fn completes_window_after_interval() {
        let t0 = Instant::now();
        let mut est = FrameRateEstimator::new(t0);
        for t in [0.0, 0.3, 0.6, 0.9] {
            assert_eq!(est.on_frame_processed(at(t0, t)), None);
        }

        let rate = est.on_frame_processed(at(t0, 1.2)).unwrap();
        assert_relative_eq!(rate, 5.0 / 1.2, epsilon = 1e-9);
        assert_relative_eq!(est.current_rate().unwrap(), 4.1666, epsilon = 1e-3);
        assert_eq!(est.frame_count(), 0);
        assert_eq!(est.window_start(), at(t0, 1.2));
    }

    #[test]
    fn exactly_one_interval_completes() {
        let t0 = Instant::now();
        let mut est = FrameRateEstimator::new(t0);
        est.on_frame_processed(at(t0, 0.5));
        let rate = est.on_frame_processed(t0 + REPORT_INTERVAL).unwrap();
        assert_relative_eq!(rate, 2.0);
    }

    #[test]
    fn sparse_frames() {
        let t0 = Instant::now();
        let mut est = FrameRateEstimator::new(t0);

        assert_eq!(est.on_frame_processed(t0), None);

        assert_eq!(est.on_frame_processed(at(t0, 2.0)), Some(1.0));
        assert_relative_eq!(est.current_rate().unwrap(), 1.0);

        // Second window holds a single frame over 2 seconds.
        let rate = est.on_frame_processed(at(t0, 4.0)).unwrap();
        assert_relative_eq!(rate, 0.5);
        assert_relative_eq!(est.current_rate().unwrap(), 0.5);
    }

    #[test]
    fn sparse_frames_from_earlier_start() {
        // The window opens 1 second before the first frame arrives.
        let t0 = Instant::now();
        let mut est = FrameRateEstimator::new(t0);

        assert_eq!(est.on_frame_processed(at(t0, 1.0 - 1e-6)), None);
        assert_eq!(est.current_rate(), None);

        let first = est.on_frame_processed(at(t0, 3.0)).unwrap();
        assert_relative_eq!(first, 2.0 / 3.0, epsilon = 1e-9);
        let second = est.on_frame_processed(at(t0, 5.0)).unwrap();
        assert_relative_eq!(second, 0.5);
    }

    #[test]
    fn rate_is_kept_between_windows() {
        let t0 = Instant::now();
        let mut est = FrameRateEstimator::new(t0);
        est.on_frame_processed(at(t0, 1.0));
        let rate = est.current_rate();
        assert!(rate.is_some());

        for t in [1.1, 1.2, 1.5, 1.9] {
            assert_eq!(est.on_frame_processed(at(t0, t)), None);
            assert_eq!(est.current_rate(), rate);
            assert_eq!(est.current_rate(), est.current_rate());
        }
        assert_eq!(est.frame_count(), 4);
    }

    #[test]
    fn timestamps_before_window_start() {
        let t0 = Instant::now();
        let start = at(t0, 10.0);
        let mut est = FrameRateEstimator::new(start);

        assert_eq!(est.on_frame_processed(t0), None);
        assert_eq!(est.on_frame_processed(at(t0, 5.0)), None);
        assert_eq!(est.current_rate(), None);
        assert_eq!(est.frame_count(), 2);
        assert_eq!(est.window_start(), start);

        // Frames with earlier timestamps still count once the window completes.
        let rate = est.on_frame_processed(at(t0, 11.0)).unwrap();
        assert_relative_eq!(rate, 3.0);
    }

    #[test]
    fn clock_going_backwards_after_update() {
        let t0 = Instant::now();
        let mut est = FrameRateEstimator::new(t0);
        est.on_frame_processed(at(t0, 1.0));
        let rate = est.current_rate();

        assert_eq!(est.on_frame_processed(at(t0, 0.5)), None);
        assert_eq!(est.current_rate(), rate);
        assert_eq!(est.window_start(), at(t0, 1.0));
    }

    #[test]
    fn random_intervals_match_window_average() {
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let t0 = Instant::now();
        let mut est = FrameRateEstimator::new(t0);

        let mut now = t0;
        let mut window_start = t0;
        let mut frames = 0u32;
        let mut updates = 0;
        for _ in 0..2000 {
            now += Duration::from_micros(rng.u64(1_000..80_000));
            frames += 1;
            match est.on_frame_processed(now) {
                Some(rate) => {
                    let elapsed = now - window_start;
                    assert!(elapsed >= REPORT_INTERVAL);
                    assert_relative_eq!(
                        rate,
                        frames as f64 / elapsed.as_secs_f64(),
                        epsilon = 1e-9
                    );
                    assert_eq!(est.frame_count(), 0);
                    assert_eq!(est.window_start(), now);
                    window_start = now;
                    frames = 0;
                    updates += 1;
                }
                None => {
                    assert!(now - window_start < REPORT_INTERVAL);
                    assert_eq!(est.frame_count(), frames);
                }
            }
        }

        assert!(updates > 0);
        assert!(est.current_rate().is_some());
    }
}
