//! Monotonic timer for animation time and frame statistics.

use std::time::{Duration, Instant};

/// Measures time since start and counts frames between rate reports.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    window_start: Instant,
    window_frames: u32,
    total_frames: u64,
}

impl Timer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            window_start: now,
            window_frames: 0,
            total_frames: 0,
        }
    }

    /// Seconds since construction; drives uniform animation.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Total number of frames recorded with [`Timer::frame`].
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Record one completed frame.
    ///
    /// Returns the average frame rate once at least `interval` has passed
    /// since the previous report, then starts a new measurement window.
    pub fn frame(&mut self, interval: Duration) -> Option<f64> {
        self.total_frames += 1;
        self.window_frames += 1;
        self.report_if_elapsed(Instant::now(), interval)
    }

    fn report_if_elapsed(&mut self, now: Instant, interval: Duration) -> Option<f64> {
        let window = now.saturating_duration_since(self.window_start);
        if window < interval || window.is_zero() {
            return None;
        }

        let rate = f64::from(self.window_frames) / window.as_secs_f64();
        self.window_start = now;
        self.window_frames = 0;
        Some(rate)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
