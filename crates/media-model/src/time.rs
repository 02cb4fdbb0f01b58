//! Media time ranges.

use serde::{Deserialize, Serialize};

/// A half-open time range `[start, start + duration)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_secs: f64,
    pub duration_secs: f64,
}

impl TimeRange {
    pub fn new(start_secs: f64, duration_secs: f64) -> Self {
        Self {
            start_secs,
            duration_secs: duration_secs.max(0.0),
        }
    }

    /// Range starting at zero.
    pub fn from_zero(duration_secs: f64) -> Self {
        Self::new(0.0, duration_secs)
    }

    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }

    pub fn is_empty(&self) -> bool {
        self.duration_secs <= 0.0
    }
}
