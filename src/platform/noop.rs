//! Non-macOS (noop) platform backend.
//!
//! This exists so the crate (and binary) can compile and run on targets
//! without `osascript`/`screencapture`. Every tick degrades to "unknown app"
//! and capture is reported as unsupported.

use crate::platform::types::{
    ActivityError, ActivitySource, BrowserTab, CaptureError, ForegroundApp, ScreenCapture,
};
use image::DynamicImage;

/// A platform that observes nothing.
#[derive(Debug, Default)]
pub struct NoopPlatform;

impl NoopPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl ActivitySource for NoopPlatform {
    fn foreground(&mut self) -> Result<ForegroundApp, ActivityError> {
        Err(ActivityError::Unsupported)
    }

    fn browser_tab(&mut self, _browser_app: &str) -> Result<Option<BrowserTab>, ActivityError> {
        Err(ActivityError::Unsupported)
    }
}

impl ScreenCapture for NoopPlatform {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        Err(CaptureError::Unsupported)
    }
}

/// On non-macOS platforms there is no permission gate.
pub fn check_permission() -> bool {
    true
}
