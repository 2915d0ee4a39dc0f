//! A single observation of foreground state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What was in the foreground at one poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// When the observation was taken
    pub timestamp: DateTime<Utc>,
    /// Frontmost application, if known and tracked
    pub active_app: Option<String>,
    /// Title of its front window, if known and tracked
    pub window_title: Option<String>,
    /// CPU usage of the frontmost app (percent of one core)
    pub cpu_percent: Option<f64>,
    /// Resident memory of the frontmost app
    pub memory_mb: Option<f64>,
}

impl UsageSnapshot {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            active_app: None,
            window_title: None,
            cpu_percent: None,
            memory_mb: None,
        }
    }

    /// Seconds from this snapshot to `later`, never negative.
    pub fn seconds_until(&self, later: DateTime<Utc>) -> f64 {
        let ms = (later - self.timestamp).num_milliseconds();
        (ms.max(0) as f64) / 1000.0
    }

    /// The app name when it is present and not blank.
    pub fn known_app(&self) -> Option<&str> {
        self.active_app.as_deref().filter(|a| !a.trim().is_empty())
    }
}
