//! Print-job ETA from sparse percentage updates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::countdown::human_readable_countdown;

/// Distinct percent points required before an estimate is shown.
pub const MIN_PERCENT_POINTS: u32 = 2;

/// Upper bound of any estimate.
pub const MAX_REMAINING: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProgressError {
    #[error("invalid printing progress: {0}")]
    OutOfRange(u8),
}

/// Estimates remaining print time.
///
/// The first non-zero percentage starts the stopwatch. Every later distinct
/// percentage adds one point and recomputes
/// `(100 - p) * elapsed / points`, keeping the smaller of the old and new
/// estimate. Progress `0` resets everything.
pub struct ProgressTracker {
    clock: Arc<dyn Clock>,
    progress: u8,
    started_at: Option<Instant>,
    points: u32,
    remaining: Duration,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            progress: 0,
            started_at: None,
            points: 0,
            remaining: MAX_REMAINING,
        }
    }

    /// Feeds one observed percentage.
    pub fn update(&mut self, progress: u8) -> Result<(), ProgressError> {
        if progress > 100 {
            return Err(ProgressError::OutOfRange(progress));
        }
        if progress == 0 {
            self.reset();
            return Ok(());
        }
        if progress == self.progress {
            return Ok(());
        }
        self.progress = progress;

        let Some(started_at) = self.started_at else {
            self.started_at = Some(self.clock.now());
            self.points = 0;
            return Ok(());
        };

        self.points += 1;
        let elapsed = self.clock.now().saturating_duration_since(started_at);
        let computed = elapsed
            .saturating_mul(u32::from(100 - progress))
            .checked_div(self.points)
            .unwrap_or(MAX_REMAINING);
        self.remaining = self.remaining.min(computed);
        Ok(())
    }

    /// Clears all state; the next non-zero percentage starts over.
    pub fn reset(&mut self) {
        self.progress = 0;
        self.started_at = None;
        self.points = 0;
        self.remaining = MAX_REMAINING;
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    /// The current estimate, once enough points have been seen.
    pub fn estimated_time_left(&self) -> Option<Duration> {
        (self.points >= MIN_PERCENT_POINTS).then_some(self.remaining)
    }

    /// Countdown text for the current estimate, or empty when unknown.
    pub fn countdown_text(&self) -> String {
        self.estimated_time_left()
            .map(|left| human_readable_countdown(left.as_secs()))
            .unwrap_or_default()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("progress", &self.progress)
            .field("points", &self.points)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn tracker() -> (ProgressTracker, ManualClock) {
        let clock = ManualClock::new();
        (ProgressTracker::with_clock(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn estimates_are_non_increasing_from_third_point() {
        let (mut tracker, clock) = tracker();
        let mut estimates = Vec::new();
        for p in [0, 10, 10, 20, 20, 30] {
            tracker.update(p).unwrap();
            estimates.push(tracker.estimated_time_left());
            clock.advance(Duration::from_secs(60));
        }

        assert_eq!(estimates[..5], [None, None, None, None, None]);
        // Stopwatch started at 10, 30 seen 4 minutes later over 2 points.
        assert_eq!(estimates[5], Some(Duration::from_secs(70 * 240 / 2)));

        tracker.update(40).unwrap();
        let later = tracker.estimated_time_left().unwrap();
        assert!(later <= estimates[5].unwrap());
    }

    #[test]
    fn estimate_only_decreases() {
        let (mut tracker, clock) = tracker();
        tracker.update(1).unwrap();
        clock.advance(Duration::from_secs(10));
        tracker.update(2).unwrap();
        clock.advance(Duration::from_secs(10));
        tracker.update(3).unwrap();
        let first = tracker.estimated_time_left().unwrap();
        assert_eq!(first, Duration::from_secs(97 * 20 / 2));

        // A long stall would raise the raw estimate.
        clock.advance(Duration::from_secs(3600));
        tracker.update(4).unwrap();
        assert_eq!(tracker.estimated_time_left(), Some(first));
    }

    #[test]
    fn zero_resets_estimate() {
        let (mut tracker, clock) = tracker();
        for p in [10, 20, 30] {
            tracker.update(p).unwrap();
            clock.advance(Duration::from_secs(30));
        }
        assert!(tracker.estimated_time_left().is_some());

        tracker.update(0).unwrap();
        assert_eq!(tracker.estimated_time_left(), None);
        assert_eq!(tracker.points(), 0);
        assert_eq!(tracker.countdown_text(), "");
    }

    #[test]
    fn estimate_is_capped_at_one_day() {
        let (mut tracker, clock) = tracker();
        tracker.update(1).unwrap();
        clock.advance(Duration::from_secs(24 * 3600));
        tracker.update(2).unwrap();
        clock.advance(Duration::from_secs(24 * 3600));
        tracker.update(3).unwrap();
        assert_eq!(tracker.estimated_time_left(), Some(MAX_REMAINING));
    }

    #[test]
    fn rejects_progress_above_hundred() {
        let (mut tracker, _) = tracker();
        assert_eq!(tracker.update(101), Err(ProgressError::OutOfRange(101)));
    }

    #[test]
    fn countdown_text_follows_estimate() {
        let (mut tracker, clock) = tracker();
        tracker.update(50).unwrap();
        clock.advance(Duration::from_secs(60));
        tracker.update(51).unwrap();
        clock.advance(Duration::from_secs(60));
        tracker.update(52).unwrap();
        // 48 * 120 s / 2 = 48 minutes.
        assert_eq!(tracker.countdown_text(), "Approximately 48 minutes left.");
    }
}
