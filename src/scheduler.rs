//! The agent loop.
//!
//! One thread drives three periodic jobs: usage polling (every tick), usage
//! upload and screen capture. Each job keeps its own last-fired timestamp, and
//! all of them are evaluated on every tick in a fixed order: poll, upload,
//! capture. Everything runs synchronously, so the ledger and the cooldown
//! state are never touched concurrently.

use crate::classifier::{Category, ClassificationResult, ContentClassifier};
use crate::config::Config;
use crate::gateway::{AgentEvent, AlertPayload, EventSink};
use crate::platform::{ActivitySource, ScreenCapture};
use crate::transparency::SharedTransparencyLog;
use crate::usage::{UsageSnapshot, UsageTracker};
use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lower bound on the sleep between ticks.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Granularity at which a sleeping loop notices Ctrl+C.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// A "last fired + interval" pair.
#[derive(Debug, Clone)]
pub struct PeriodicTimer {
    interval: Duration,
    last_fired: Option<DateTime<Utc>>,
}

impl PeriodicTimer {
    /// A timer that has never fired, so it is due immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => {
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                elapsed >= self.interval
            }
        }
    }

    pub fn mark(&mut self, now: DateTime<Utc>) {
        self.last_fired = Some(now);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_fired(&self) -> Option<DateTime<Utc>> {
        self.last_fired
    }
}

/// Scheduler settings, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub device_id: String,
    pub poll_interval: Duration,
    pub upload_interval: Duration,
    pub capture_enabled: bool,
    pub capture_interval: Duration,
    /// Classify every Nth capture (>= 1)
    pub classify_every_n: u32,
    pub alert_cooldown: Duration,
    pub screenshot_dir: Option<PathBuf>,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device_id: config.resolved_device_id(),
            poll_interval: config.usage.poll_interval,
            upload_interval: config.backend.upload_interval,
            capture_enabled: config.capture.enabled,
            capture_interval: config.capture.interval,
            classify_every_n: config.capture.run_every_n(),
            alert_cooldown: config.classifier.alert_cooldown,
            screenshot_dir: config.capture.screenshot_dir.clone(),
        }
    }

    /// Sleep between ticks: half the shortest interval, at least
    /// [`MIN_TICK_INTERVAL`].
    ///
    /// The capture interval only takes part while capture is enabled, so a
    /// disabled capture job cannot make the loop spin faster.
    pub fn tick_interval(&self) -> Duration {
        let mut shortest = self.poll_interval.min(self.upload_interval);
        if self.capture_enabled {
            shortest = shortest.min(self.capture_interval);
        }
        (shortest / 2).max(MIN_TICK_INTERVAL)
    }
}

/// What happened to the capture job on one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Disabled or interval not yet elapsed
    NotDue,
    /// The capture capability returned nothing
    CaptureFailed,
    /// Captured, but not classified on this capture
    Captured,
    /// Classified with no alert-worthy result
    Classified(ClassificationResult),
    /// Flagged but held back by the cooldown
    Suppressed(Vec<Category>),
    /// Alert dispatched; `delivered` is the sink's verdict
    Alerted {
        categories: Vec<Category>,
        delivered: bool,
    },
}

/// Summary of one tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: UsageSnapshot,
    /// `None` when no upload was due, otherwise whether it was accepted
    pub upload: Option<bool>,
    pub capture: CaptureOutcome,
}

/// The orchestrator: owns the tracker, classifier and event sink.
pub struct Agent {
    settings: AgentSettings,
    tracker: UsageTracker,
    classifier: Option<ContentClassifier>,
    source: Box<dyn ActivitySource>,
    screen: Box<dyn ScreenCapture>,
    sink: Box<dyn EventSink>,
    upload_timer: PeriodicTimer,
    capture_timer: PeriodicTimer,
    capture_count: u64,
    log: SharedTransparencyLog,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: AgentSettings,
        tracker: UsageTracker,
        classifier: Option<ContentClassifier>,
        source: Box<dyn ActivitySource>,
        screen: Box<dyn ScreenCapture>,
        sink: Box<dyn EventSink>,
        log: SharedTransparencyLog,
    ) -> Self {
        let upload_timer = PeriodicTimer::new(settings.upload_interval);
        let capture_timer = PeriodicTimer::new(settings.capture_interval);
        Self {
            settings,
            tracker,
            classifier,
            source,
            screen,
            sink,
            upload_timer,
            capture_timer,
            capture_count: 0,
            log,
        }
    }

    /// Run one tick at the current time.
    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Utc::now())
    }

    /// Run one tick: poll, then upload if due, then capture if due.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> TickReport {
        let snapshot = self.tracker.poll_at(now, self.source.as_mut());
        self.log.record_poll();

        let upload = if self.upload_timer.is_due(now) {
            let accepted = self.upload_summary(now);
            // Marked either way; a failed upload waits for the next interval.
            self.upload_timer.mark(now);
            Some(accepted)
        } else {
            None
        };

        let capture = if self.settings.capture_enabled && self.capture_timer.is_due(now) {
            self.capture_timer.mark(now);
            self.capture_and_classify(now)
        } else {
            CaptureOutcome::NotDue
        };

        TickReport {
            snapshot,
            upload,
            capture,
        }
    }

    fn upload_summary(&mut self, now: DateTime<Utc>) -> bool {
        let summary = self.tracker.summary();
        let total_min = (summary.total_seconds / 60.0) as u64;
        let app_count = summary.app_seconds.len();

        let event = AgentEvent::usage_summary(self.settings.device_id.clone(), now, summary);
        let accepted = self.sink.dispatch(&event);
        self.log.record_upload(accepted);

        if accepted {
            info!("Usage uploaded | total={total_min} min | apps={app_count}");
        }
        accepted
    }

    fn capture_and_classify(&mut self, now: DateTime<Utc>) -> CaptureOutcome {
        self.capture_count += 1;

        let image = match self.screen.capture() {
            Ok(image) => image,
            Err(e) => {
                debug!("Screen capture failed: {e}");
                return CaptureOutcome::CaptureFailed;
            }
        };
        self.log.record_capture();

        if let Some(ref dir) = self.settings.screenshot_dir {
            save_screenshot(&image, dir, now);
        }

        let every_n = u64::from(self.settings.classify_every_n.max(1));
        if self.capture_count % every_n != 0 {
            return CaptureOutcome::Captured;
        }
        let Some(classifier) = self.classifier.as_mut() else {
            return CaptureOutcome::Captured;
        };

        let result = classifier.check(&image);
        self.log.record_classification();

        if !result.exceeds_threshold(classifier.threshold()) {
            return CaptureOutcome::Classified(result);
        }

        if classifier.apply_cooldown_at(&result.categories, self.settings.alert_cooldown, now) {
            debug!("Alert suppressed by cooldown: {:?}", result.categories);
            self.log.record_alert_suppressed();
            return CaptureOutcome::Suppressed(result.categories);
        }

        let categories = result.categories.clone();
        let payload = AlertPayload::new(
            result.categories,
            result.confidence,
            result.details,
            self.tracker.current_context(),
        );
        let event = AgentEvent::alert(self.settings.device_id.clone(), now, payload);
        let delivered = self.sink.dispatch(&event);
        self.log.record_alert(delivered);
        if delivered {
            info!("Alert sent: {categories:?}");
        }

        CaptureOutcome::Alerted {
            categories,
            delivered,
        }
    }

    /// Tick until `running` is cleared.
    ///
    /// `is_paused` is consulted before every tick; paused ticks do nothing
    /// and the paused span is not attributed to any app.
    pub fn run<F>(&mut self, running: &AtomicBool, mut is_paused: F)
    where
        F: FnMut() -> bool,
    {
        let interval = self.settings.tick_interval();
        let mut paused = false;

        info!(
            "Agent started | device_id={} | upload_every={}s | capture={} (every {}s) | classifier={}",
            self.settings.device_id,
            self.settings.upload_interval.as_secs(),
            if self.settings.capture_enabled { "on" } else { "off" },
            self.settings.capture_interval.as_secs(),
            self.classifier.as_ref().map(|c| c.mode()).unwrap_or("off"),
        );

        while running.load(Ordering::SeqCst) {
            let now_paused = is_paused();
            if now_paused != paused {
                paused = now_paused;
                if paused {
                    info!("Monitoring paused");
                    self.tracker.suspend();
                } else {
                    info!("Monitoring resumed");
                }
            }

            if !paused {
                let report = self.tick();
                debug!(
                    "Tick | app={:?} | upload={:?} | capture={:?}",
                    report.snapshot.active_app, report.upload, report.capture
                );
            }

            sleep_while_running(running, interval);
        }

        info!("Agent stopped");
    }

    pub fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn capture_count(&self) -> u64 {
        self.capture_count
    }

    pub fn transparency_log(&self) -> &SharedTransparencyLog {
        &self.log
    }
}

fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let mut remaining = total;
    while !remaining.is_zero() && running.load(Ordering::SeqCst) {
        let step = remaining.min(SLEEP_SLICE);
        thread::sleep(step);
        remaining -= step;
    }
}

/// Path a frame captured at `at` is saved under.
pub fn screenshot_path(dir: &Path, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("screen_{}.png", at.timestamp()))
}

fn save_screenshot(image: &DynamicImage, dir: &Path, at: DateTime<Utc>) {
    let path = screenshot_path(dir, at);
    let result = std::fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|_| image.save(&path).map_err(|e| e.to_string()));

    match result {
        Ok(()) => info!("Screenshot saved: {}", path.display()),
        Err(e) => warn!("Could not save screenshot to {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn settings() -> AgentSettings {
        AgentSettings {
            device_id: "agent-test".to_string(),
            poll_interval: Duration::from_secs(10),
            upload_interval: Duration::from_secs(60),
            capture_enabled: true,
            capture_interval: Duration::from_secs(60),
            classify_every_n: 1,
            alert_cooldown: Duration::from_secs(300),
            screenshot_dir: None,
        }
    }

    #[test]
    fn test_timer_due_on_first_check() {
        let timer = PeriodicTimer::new(Duration::from_secs(60));
        assert!(timer.is_due(at(0)));
        assert_eq!(timer.last_fired(), None);
    }

    #[test]
    fn test_timer_interval_boundary() {
        let mut timer = PeriodicTimer::new(Duration::from_secs(60));
        timer.mark(at(0));
        assert!(!timer.is_due(at(59)));
        assert!(timer.is_due(at(60)));
        assert!(timer.is_due(at(600)));
    }

    #[test]
    fn test_timer_clock_going_backwards() {
        let mut timer = PeriodicTimer::new(Duration::from_secs(60));
        timer.mark(at(100));
        assert!(!timer.is_due(at(50)));
    }

    #[test]
    fn test_tick_interval_is_half_the_shortest() {
        assert_eq!(settings().tick_interval(), Duration::from_secs(5));

        let slow = AgentSettings {
            poll_interval: Duration::from_secs(30),
            upload_interval: Duration::from_secs(120),
            capture_interval: Duration::from_secs(40),
            ..settings()
        };
        assert_eq!(slow.tick_interval(), Duration::from_secs(15));

        let no_capture = AgentSettings {
            capture_enabled: false,
            capture_interval: Duration::from_secs(2),
            poll_interval: Duration::from_secs(60),
            ..settings()
        };
        assert_eq!(no_capture.tick_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_tick_interval_ignores_disabled_capture() {
        let enabled = AgentSettings {
            poll_interval: Duration::from_secs(60),
            upload_interval: Duration::from_secs(120),
            capture_interval: Duration::from_secs(20),
            ..settings()
        };
        assert_eq!(enabled.tick_interval(), Duration::from_secs(10));

        let disabled = AgentSettings {
            capture_enabled: false,
            ..enabled
        };
        assert_eq!(disabled.tick_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_tick_interval_floor() {
        let fast = AgentSettings {
            poll_interval: Duration::from_secs(1),
            ..settings()
        };
        assert_eq!(fast.tick_interval(), MIN_TICK_INTERVAL);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.device_id = Some("kid-laptop".to_string());
        config.capture.classifier_run_every_n = 0;

        let settings = AgentSettings::from_config(&config);
        assert_eq!(settings.device_id, "kid-laptop");
        assert_eq!(settings.classify_every_n, 1);
        assert_eq!(settings.alert_cooldown, Duration::from_secs(300));
    }

    #[test]
    fn test_screenshot_path() {
        let path = screenshot_path(Path::new("/tmp/shots"), at(0));
        assert_eq!(path, PathBuf::from("/tmp/shots/screen_1700000000.png"));
    }
}
