//! Usage accounting for the Safety Sensor Agent.
//!
//! This module contains:
//! - Snapshots of the foreground app taken on every poll
//! - The tracker that turns successive snapshots into per-app and per-URL time
//! - URL normalization for browser tabs

pub mod snapshot;
pub mod tracker;
pub mod url;

// Re-export commonly used types
pub use snapshot::UsageSnapshot;
pub use tracker::{CurrentContext, UsageSummary, UsageTracker};
pub use url::{is_internal_url, normalize_url};
