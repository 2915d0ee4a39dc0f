//! Operating-system capabilities used by the agent.
//!
//! The usage tracker and the scheduler only see the [`ActivitySource`] and
//! [`ScreenCapture`] traits. On macOS they are backed by `osascript` and
//! `screencapture`; elsewhere a noop platform reports nothing.

pub mod applescript;
pub mod process;
pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod noop;

// Re-export commonly used types
pub use process::{run_with_timeout, ProcessError};
pub use types::{
    ActivityError, ActivitySource, BrowserTab, CaptureError, ForegroundApp, ProcessStats,
    ScreenCapture,
};

#[cfg(target_os = "macos")]
pub use macos::{check_permission, MacOSPlatform};

/// Platform-agnostic platform type alias
#[cfg(target_os = "macos")]
pub type Platform = MacOSPlatform;

#[cfg(not(target_os = "macos"))]
pub use noop::{check_permission, NoopPlatform};

/// Platform-agnostic platform type alias
#[cfg(not(target_os = "macos"))]
pub type Platform = NoopPlatform;
