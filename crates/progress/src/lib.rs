//! Time-left estimation for print jobs and uploads.
//!
//! The printer only reports an integer percentage, so the print estimate is
//! paced by distinct percent points rather than elapsed print time.

pub mod clock;
pub mod countdown;
pub mod tracker;
pub mod upload;

pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::human_readable_countdown;
pub use tracker::{MAX_REMAINING, MIN_PERCENT_POINTS, ProgressError, ProgressTracker};
pub use upload::{CALCULATING_TEXT, MIN_CALCULATION_TIME, UploadEstimator};
