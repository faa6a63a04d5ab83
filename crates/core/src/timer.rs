//! Frame timing for pacing statistics.

use std::time::{Duration, Instant};

/// Measures per-tick delta time and aggregates it into periodic reports.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    window_start: Instant,
    window_frames: u32,
    report_interval: Duration,
}

/// Aggregated frame statistics over one report window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Number of frames in the window.
    pub frames: u32,
    /// Length of the window.
    pub elapsed: Duration,
}

impl FrameStats {
    /// Frames per second over the window.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    /// Average frame time in milliseconds.
    pub fn avg_frame_ms(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.elapsed.as_secs_f64() * 1000.0 / self.frames as f64
    }
}

impl Timer {
    /// Create a new timer reporting once per second.
    pub fn new() -> Self {
        Self::with_report_interval(Duration::from_secs(1))
    }

    /// Create a timer with a custom report interval.
    pub fn with_report_interval(report_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            window_start: now,
            window_frames: 0,
            report_interval,
        }
    }

    /// Total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Count one presented frame. Returns the stats of the finished window
    /// once the report interval has passed.
    pub fn record_frame(&mut self) -> Option<FrameStats> {
        self.record_frame_at(Instant::now())
    }

    fn record_frame_at(&mut self, now: Instant) -> Option<FrameStats> {
        self.window_frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.report_interval {
            return None;
        }

        let stats = FrameStats {
            frames: self.window_frames,
            elapsed,
        };
        self.window_start = now;
        self.window_frames = 0;
        Some(stats)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_report_before_interval() {
        let mut timer = Timer::with_report_interval(Duration::from_secs(60));
        let now = timer.window_start;
        assert!(timer.record_frame_at(now).is_none());
        assert!(timer.record_frame_at(now + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_report_after_interval_resets_window() {
        let mut timer = Timer::with_report_interval(Duration::from_secs(1));
        let start = timer.window_start;
        for i in 1..4 {
            assert!(timer.record_frame_at(start + Duration::from_millis(i * 100)).is_none());
        }
        let stats = timer
            .record_frame_at(start + Duration::from_millis(1000))
            .unwrap();
        assert_eq!(stats.frames, 4);
        assert!((stats.fps() - 4.0).abs() < 1e-9);
        assert!((stats.avg_frame_ms() - 250.0).abs() < 1e-9);
        assert_eq!(timer.window_frames, 0);
    }

    #[test]
    fn test_empty_stats() {
        let stats = FrameStats {
            frames: 0,
            elapsed: Duration::ZERO,
        };
        assert_eq!(stats.fps(), 0.0);
        assert_eq!(stats.avg_frame_ms(), 0.0);
    }
}
