//! Frame timing, owned by the run loop.

use std::time::{Duration, Instant};

const WINDOW: u32 = 100;

/// Tracks the inter-frame delta for camera movement and a rolling average of
/// draw times, reported once per 100-frame window.
pub struct FrameTimer {
    last_tick: Instant,
    frames: u32,
    total: Duration,
}

impl FrameTimer {
    pub fn new() -> FrameTimer {
        FrameTimer {
            last_tick: Instant::now(),
            frames: 0,
            total: Duration::ZERO,
        }
    }

    /// Seconds since the previous tick.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now - self.last_tick;
        self.last_tick = now;
        dt.as_secs_f32()
    }

    /// Record one frame's draw duration; returns the average in milliseconds
    /// once per window and restarts it.
    pub fn record(&mut self, duration: Duration) -> Option<f64> {
        self.frames += 1;
        self.total += duration;
        if self.frames < WINDOW {
            return None;
        }
        let average = self.total.as_secs_f64() * 1000.0 / f64::from(self.frames);
        self.frames = 0;
        self.total = Duration::ZERO;
        Some(average)
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        FrameTimer::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_average_once_per_window() {
        let mut timer = FrameTimer::new();
        for _ in 0..WINDOW - 1 {
            assert_eq!(timer.record(Duration::from_millis(4)), None);
        }
        let avg = timer.record(Duration::from_millis(4)).unwrap();
        assert!((avg - 4.0).abs() < 1e-9);
        // window restarts
        assert_eq!(timer.record(Duration::from_millis(4)), None);
    }
}
