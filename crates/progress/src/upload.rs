//! Upload time-left estimation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::countdown::human_readable_countdown;
use crate::tracker::MAX_REMAINING;

/// Shown until enough of the upload has been timed.
pub const CALCULATING_TEXT: &str = "Calculating time left...";

/// Elapsed time after which the average speed is trusted.
pub const MIN_CALCULATION_TIME: Duration = Duration::from_secs(5);

/// Estimates remaining upload time from the average transfer speed.
///
/// Estimates start after [`MIN_CALCULATION_TIME`] and only ever go down.
pub struct UploadEstimator {
    clock: Arc<dyn Clock>,
    started_at: Instant,
    remaining: Duration,
    percent: f64,
    text: String,
}

impl UploadEstimator {
    /// Starts timing an upload now.
    pub fn start() -> Self {
        Self::start_with_clock(Arc::new(SystemClock))
    }

    pub fn start_with_clock(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            started_at,
            remaining: MAX_REMAINING,
            percent: 0.0,
            text: CALCULATING_TEXT.to_string(),
        }
    }

    /// Records transfer progress.
    pub fn update(&mut self, bytes_sent: u64, bytes_total: u64) {
        self.percent = if bytes_total == 0 {
            0.0
        } else {
            bytes_sent as f64 / bytes_total as f64 * 100.0
        };

        let elapsed = self.clock.now().saturating_duration_since(self.started_at);
        if elapsed <= MIN_CALCULATION_TIME {
            return;
        }

        let speed = bytes_sent as f64 / elapsed.as_secs_f64();
        let remaining = if speed > 0.0 {
            Duration::from_secs_f64(bytes_total.saturating_sub(bytes_sent) as f64 / speed)
        } else {
            Duration::ZERO
        };
        if remaining < self.remaining {
            self.remaining = remaining;
            self.text = human_readable_countdown(remaining.as_secs());
        }
    }

    /// Completed share of the upload, 0 to 100.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn estimated_time_left(&self) -> Option<Duration> {
        (self.remaining < MAX_REMAINING).then_some(self.remaining)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Debug for UploadEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadEstimator")
            .field("remaining", &self.remaining)
            .field("percent", &self.percent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn calculating_until_five_seconds() {
        let clock = ManualClock::new();
        let mut estimator = UploadEstimator::start_with_clock(Arc::new(clock.clone()));
        clock.advance(Duration::from_secs(5));
        estimator.update(500, 1000);
        assert_eq!(estimator.text(), CALCULATING_TEXT);
        assert_eq!(estimator.estimated_time_left(), None);
        assert_eq!(estimator.percent(), 50.0);
    }

    #[test]
    fn estimates_from_average_speed() {
        let clock = ManualClock::new();
        let mut estimator = UploadEstimator::start_with_clock(Arc::new(clock.clone()));
        clock.advance(Duration::from_secs(10));
        estimator.update(1000, 7000);
        // 100 B/s with 6000 B left.
        assert_eq!(estimator.estimated_time_left(), Some(Duration::from_secs(60)));
        assert_eq!(estimator.text(), "Approximately 1 minute left.");
    }

    #[test]
    fn estimate_only_goes_down() {
        let clock = ManualClock::new();
        let mut estimator = UploadEstimator::start_with_clock(Arc::new(clock.clone()));
        clock.advance(Duration::from_secs(10));
        estimator.update(1000, 2000);
        assert_eq!(estimator.estimated_time_left(), Some(Duration::from_secs(10)));

        // Speed halves; the raw estimate would grow.
        clock.advance(Duration::from_secs(30));
        estimator.update(1100, 2000);
        assert_eq!(estimator.estimated_time_left(), Some(Duration::from_secs(10)));
        assert_eq!(estimator.text(), "Approximately 10 seconds left.");
    }

    #[test]
    fn zero_total_is_zero_percent() {
        let mut estimator = UploadEstimator::start();
        estimator.update(0, 0);
        assert_eq!(estimator.percent(), 0.0);
    }
}
