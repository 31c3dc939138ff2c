//! Pause/resume emulation for sinks that cannot pause a sounding clip.
//!
//! The tracker remembers when the current clip started and at what rate.
//! Pausing freezes `offset + (now - start) * rate`; resuming replays the same
//! clip from that offset. Time comes from [`tokio::time::Instant`] so paused
//! test clocks drive it deterministically.

use std::time::Duration;

use tokio::time::Instant;

/// Playback clock for the clip currently handed to the sink.
#[derive(Debug, Clone, Copy)]
pub struct PauseTracker {
    started_at: Option<Instant>,
    rate: f32,
    offset: Duration,
}

impl Default for PauseTracker {
    fn default() -> Self {
        Self {
            started_at: None,
            rate: 1.0,
            offset: Duration::ZERO,
        }
    }
}

impl PauseTracker {
    /// Clip started (or restarted) at `offset` into its audio.
    pub fn start(&mut self, offset: Duration, rate: f32) {
        self.rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        self.offset = offset;
        self.started_at = Some(Instant::now());
    }

    /// Position within the clip's audio.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.map_or(self.offset, |started| {
            self.offset + started.elapsed().mul_f64(f64::from(self.rate))
        })
    }

    /// Freeze the clock and return the offset to resume from.
    pub fn pause(&mut self) -> Duration {
        self.offset = self.elapsed();
        self.started_at = None;
        self.offset
    }

    /// Rate the clip is playing at.
    #[must_use]
    pub const fn rate(&self) -> f32 {
        self.rate
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Frozen offset while paused.
    #[must_use]
    pub const fn offset(&self) -> Duration {
        self.offset
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_scales_with_rate() {
        let mut tracker = PauseTracker::default();
        tracker.start(Duration::ZERO, 1.5);

        tokio::time::advance(Duration::from_millis(400)).await;

        let drift = tracker.elapsed().abs_diff(Duration::from_millis(600));
        assert!(drift < Duration::from_micros(1));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_freezes_offset() {
        let mut tracker = PauseTracker::default();
        tracker.start(Duration::ZERO, 1.0);
        tokio::time::advance(Duration::from_millis(400)).await;

        let offset = tracker.pause();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(offset, Duration::from_millis(400));
        assert_eq!(tracker.elapsed(), Duration::from_millis(400));
        assert!(!tracker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_accumulates_from_offset() {
        let mut tracker = PauseTracker::default();
        tracker.start(Duration::ZERO, 1.0);
        tokio::time::advance(Duration::from_millis(300)).await;
        let offset = tracker.pause();

        tracker.start(offset, 1.0);
        tokio::time::advance(Duration::from_millis(200)).await;

        assert_eq!(tracker.pause(), Duration::from_millis(500));
    }

    #[test]
    fn invalid_rate_falls_back_to_normal_speed() {
        let mut tracker = PauseTracker::default();
        tracker.start(Duration::from_millis(100), f32::NAN);
        assert!((tracker.rate() - 1.0).abs() < f32::EPSILON);
        tracker.reset();
        assert_eq!(tracker.offset(), Duration::ZERO);
    }
}
