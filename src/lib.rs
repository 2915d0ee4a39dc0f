//! Safety Sensor Agent - on-device usage tracking and harmful-content alerts.
//!
//! This library provides the pieces of a background agent that records how
//! long each application (and browser page) is in the foreground, periodically
//! looks at the screen for harmful content, and reports usage summaries and
//! alerts to a backend.
//!
//! # What leaves the device
//!
//! - **Usage totals**: seconds per app and per page, uploaded periodically
//! - **Alerts**: category, confidence and the app/page being viewed
//! - **Never screenshots**: frames are analysed in memory; OCR text is only
//!   sent to the moderation API when the remote classifier is configured
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Safety Sensor Agent                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │  Platform   │──▶│    Usage    │──▶│   Summary   │──┐      │
//! │  │   (query)   │   │   Tracker   │   │   (upload)  │  │      │
//! │  └─────────────┘   └─────────────┘   └─────────────┘  ▼      │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐ ┌─────┐ │
//! │  │  Platform   │──▶│ Classifier  │──▶│  Cooldown   │▶│Gate-│ │
//! │  │  (capture)  │   │ (OCR+model) │   │  Registry   │ │ way │ │
//! │  └─────────────┘   └─────────────┘   └─────────────┘ └─────┘ │
//! │                 all driven by the Scheduler tick             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use safety_sensor_agent::{config::Config, platform::Platform, usage::UsageTracker};
//!
//! let config = Config::load().unwrap_or_default();
//! let mut tracker = UsageTracker::new(config.usage.clone());
//! let mut source = Platform::new();
//!
//! let snapshot = tracker.poll(&mut source);
//! println!("Foreground: {:?}", snapshot.active_app);
//! ```

pub mod classifier;
pub mod config;
pub mod gateway;
pub mod platform;
pub mod scheduler;
pub mod transparency;
pub mod usage;

// Re-export key types at crate root for convenience
pub use classifier::{Category, ClassificationResult, ContentClassifier, CooldownRegistry};
pub use config::{Config, ConfigError};
pub use gateway::{AgentEvent, BlockingBackendClient, EventSink, GatewayError};
pub use scheduler::{Agent, AgentSettings, CaptureOutcome, TickReport};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};
pub use usage::{CurrentContext, UsageSnapshot, UsageSummary, UsageTracker};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Disclosure that can be displayed to the monitored user.
pub const DISCLOSURE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║             SAFETY SENSOR AGENT - MONITORING DISCLOSURE          ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This device is monitored by a safety agent.                     ║
║                                                                  ║
║  ✓ WHAT IS RECORDED:                                             ║
║    • Which application is in front, and for how long            ║
║    • Window titles and browser page addresses (if enabled)       ║
║    • Periodic screenshots, checked for harmful content           ║
║                                                                  ║
║  ✓ WHAT IS SENT:                                                 ║
║    • Usage totals per app and per page                           ║
║    • Alerts naming a category (e.g. violence, self-harm)         ║
║      together with the app or page on screen                     ║
║                                                                  ║
║  ✗ WHAT IS NEVER SENT:                                           ║
║    • Screenshots themselves                                      ║
║    • Keystrokes                                                  ║
║                                                                  ║
║  Repeated alerts of the same kind are held back for a cooldown   ║
║  period. You can view activity statistics anytime with:          ║
║    safety-sensor status                                          ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disclosure_contents() {
        assert!(DISCLOSURE.contains("DISCLOSURE"));
        assert!(DISCLOSURE.contains("NEVER SENT"));
        assert!(DISCLOSURE.contains("Screenshots themselves"));
    }
}
