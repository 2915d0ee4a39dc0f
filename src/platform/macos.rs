//! macOS implementation of the activity source and screen capture.
//!
//! Foreground and browser queries go through `osascript` (requires the
//! Accessibility permission); screenshots go through `screencapture`
//! (requires Screen Recording).

use crate::platform::applescript::{
    browser_tab_script, parse_single_value, parse_tab_info, FRONTMOST_APP_SCRIPT,
    FRONT_WINDOW_TITLE_SCRIPT,
};
use crate::platform::process::run_with_timeout;
use crate::platform::types::{
    ActivityError, ActivitySource, BrowserTab, CaptureError, ForegroundApp, ProcessStats,
    ScreenCapture,
};
use image::DynamicImage;
use std::process::Command;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};

const FRONTMOST_TIMEOUT: Duration = Duration::from_secs(5);
const WINDOW_TITLE_TIMEOUT: Duration = Duration::from_secs(3);
const BROWSER_TAB_TIMEOUT: Duration = Duration::from_secs(3);
const SCREENCAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// The macOS platform backend.
pub struct MacOSPlatform {
    system: System,
}

impl MacOSPlatform {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MacOSPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn osascript(script: &str, timeout: Duration) -> Result<String, ActivityError> {
    let mut cmd = Command::new("osascript");
    cmd.arg("-e").arg(script);
    let output =
        run_with_timeout(cmd, timeout).map_err(|e| ActivityError::QueryFailed(e.to_string()))?;
    if !output.status.success() {
        return Err(ActivityError::QueryFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

impl ActivitySource for MacOSPlatform {
    fn foreground(&mut self) -> Result<ForegroundApp, ActivityError> {
        let name = parse_single_value(&osascript(FRONTMOST_APP_SCRIPT, FRONTMOST_TIMEOUT)?);
        if name.is_none() {
            return Ok(ForegroundApp::unknown());
        }

        // Some apps have no front window; the app name is still useful.
        let window_title = match osascript(FRONT_WINDOW_TITLE_SCRIPT, WINDOW_TITLE_TIMEOUT) {
            Ok(out) => parse_single_value(&out),
            Err(e) => {
                tracing::debug!("Window title unavailable: {e}");
                None
            }
        };

        Ok(ForegroundApp { name, window_title })
    }

    fn browser_tab(&mut self, browser_app: &str) -> Result<Option<BrowserTab>, ActivityError> {
        let out = osascript(&browser_tab_script(browser_app), BROWSER_TAB_TIMEOUT)?;
        Ok(parse_tab_info(&out))
    }

    fn process_stats(&mut self, app_name: &str) -> Option<ProcessStats> {
        // CPU usage is a delta between refreshes; the first reading is zero.
        self.system.refresh_processes(ProcessesToUpdate::All);
        let process = self
            .system
            .processes()
            .values()
            .find(|p| p.name().to_string_lossy() == app_name)?;
        Some(ProcessStats {
            cpu_percent: f64::from(process.cpu_usage()),
            memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
        })
    }
}

impl ScreenCapture for MacOSPlatform {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        let dir = tempfile::tempdir().map_err(|e| CaptureError::CommandFailed(e.to_string()))?;
        let path = dir.path().join("screen.png");

        let mut cmd = Command::new("screencapture");
        cmd.args(["-x", "-t", "png"]).arg(&path);
        let output = run_with_timeout(cmd, SCREENCAPTURE_TIMEOUT)
            .map_err(|e| CaptureError::CommandFailed(e.to_string()))?;
        if !output.status.success() {
            return Err(CaptureError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        image::open(&path).map_err(|e| CaptureError::Decode(e.to_string()))
    }
}

/// Whether the Accessibility permission lets us read the frontmost app.
pub fn check_permission() -> bool {
    matches!(
        osascript(FRONTMOST_APP_SCRIPT, FRONTMOST_TIMEOUT),
        Ok(ref out) if parse_single_value(out).is_some()
    )
}
