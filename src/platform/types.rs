//! Capability traits and the values they return.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// The application currently in the foreground.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundApp {
    /// Application name as reported by the OS
    pub name: Option<String>,
    /// Title of its front window
    pub window_title: Option<String>,
}

impl ForegroundApp {
    pub fn new(name: impl Into<String>, window_title: Option<&str>) -> Self {
        Self {
            name: Some(name.into()),
            window_title: window_title.map(str::to_string),
        }
    }

    /// Nothing is known about the foreground.
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Active tab of the tracked browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserTab {
    pub url: String,
    pub title: Option<String>,
}

/// Resource usage of the foreground app.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessStats {
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// Queries the OS for what the user is looking at.
pub trait ActivitySource {
    /// Frontmost application and window title.
    fn foreground(&mut self) -> Result<ForegroundApp, ActivityError>;

    /// Active tab of `browser_app`, if it has one.
    fn browser_tab(&mut self, browser_app: &str) -> Result<Option<BrowserTab>, ActivityError>;

    /// CPU and memory of the named app.
    fn process_stats(&mut self, _app_name: &str) -> Option<ProcessStats> {
        None
    }
}

/// Acquires a single frame of screen content.
pub trait ScreenCapture {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError>;
}

/// Errors from foreground/browser queries.
#[derive(Debug)]
pub enum ActivityError {
    /// The platform has no way to answer
    Unsupported,
    /// The query ran but failed
    QueryFailed(String),
}

impl std::fmt::Display for ActivityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityError::Unsupported => write!(f, "Activity queries are not supported on this platform"),
            ActivityError::QueryFailed(e) => write!(f, "Activity query failed: {e}"),
        }
    }
}

impl std::error::Error for ActivityError {}

/// Errors from screen capture.
#[derive(Debug)]
pub enum CaptureError {
    Unsupported,
    CommandFailed(String),
    Decode(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Unsupported => write!(f, "Screen capture is not supported on this platform"),
            CaptureError::CommandFailed(e) => write!(f, "Screen capture failed: {e}"),
            CaptureError::Decode(e) => write!(f, "Could not decode screenshot: {e}"),
        }
    }
}

impl std::error::Error for CaptureError {}
