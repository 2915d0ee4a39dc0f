//! Accumulates foreground time into per-app and per-URL totals.
//!
//! Time between two polls is attributed to whatever was in the foreground at
//! the *earlier* poll, so a switch is never counted twice.

use crate::config::UsageSettings;
use crate::platform::{ActivityError, ActivitySource, BrowserTab, ForegroundApp, ProcessStats};
use crate::usage::snapshot::UsageSnapshot;
use crate::usage::url::{is_internal_url, normalize_url};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Read-only projection of the ledger, uploaded as a `usage_summary` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Session start (unix seconds)
    pub session_start_ts: f64,
    /// Seconds from session start to the latest poll
    pub total_seconds: f64,
    /// Foreground seconds per app
    pub app_seconds: BTreeMap<String, f64>,
    pub last_app: Option<String>,
    pub last_window_title: Option<String>,
    /// Foreground seconds per normalized URL (only after browser activity)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_seconds: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_url: Option<String>,
    /// Last seen page title per normalized URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_titles: Option<BTreeMap<String, String>>,
}

/// What the user is looking at right now; attached to alerts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentContext {
    pub app: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// Tracks foreground usage over a session.
pub struct UsageTracker {
    settings: UsageSettings,
    session_start: DateTime<Utc>,
    last_snapshot: Option<UsageSnapshot>,
    app_seconds: BTreeMap<String, f64>,
    url_seconds: BTreeMap<String, f64>,
    url_titles: BTreeMap<String, String>,
    /// Most recent tracked URL, kept after leaving the browser
    last_url: Option<String>,
    /// URL active at the previous poll, if the browser was frontmost
    prev_browser_url: Option<String>,
    /// Set while paused; the next poll attributes nothing
    suspended: bool,
}

impl UsageTracker {
    /// Create a tracker whose session starts now.
    pub fn new(settings: UsageSettings) -> Self {
        Self::with_session_start(settings, Utc::now())
    }

    pub fn with_session_start(settings: UsageSettings, session_start: DateTime<Utc>) -> Self {
        Self {
            settings,
            session_start,
            last_snapshot: None,
            app_seconds: BTreeMap::new(),
            url_seconds: BTreeMap::new(),
            url_titles: BTreeMap::new(),
            last_url: None,
            prev_browser_url: None,
            suspended: false,
        }
    }

    /// Take a snapshot through `source` and update the ledger.
    pub fn poll(&mut self, source: &mut dyn ActivitySource) -> UsageSnapshot {
        self.poll_at(Utc::now(), source)
    }

    /// Like [`poll`](Self::poll) with an explicit timestamp.
    ///
    /// Query failures degrade to "unknown" for this tick only.
    pub fn poll_at(&mut self, now: DateTime<Utc>, source: &mut dyn ActivitySource) -> UsageSnapshot {
        let foreground = if self.settings.track_active_app || self.settings.track_window_title {
            source.foreground().unwrap_or_else(|e| {
                debug!("Foreground query failed: {e}");
                ForegroundApp::unknown()
            })
        } else {
            ForegroundApp::unknown()
        };

        let stats = match foreground.name {
            Some(ref name) if self.settings.track_cpu_memory => source.process_stats(name),
            _ => None,
        };

        let browser_app = self.settings.browser_app.clone();
        self.record(now, foreground, stats, || source.browser_tab(&browser_app))
    }

    /// Fold one observation into the ledger.
    ///
    /// `browser_tab` is only invoked when the frontmost app is the tracked
    /// browser and URL tracking is on.
    pub fn record<F>(
        &mut self,
        now: DateTime<Utc>,
        foreground: ForegroundApp,
        stats: Option<ProcessStats>,
        browser_tab: F,
    ) -> UsageSnapshot
    where
        F: FnOnce() -> Result<Option<BrowserTab>, ActivityError>,
    {
        let browser_is_front = foreground.name.as_deref() == Some(self.settings.browser_app.as_str());

        let snapshot = UsageSnapshot {
            timestamp: now,
            active_app: foreground.name.filter(|_| self.settings.track_active_app),
            window_title: foreground
                .window_title
                .filter(|_| self.settings.track_window_title),
            cpu_percent: stats.map(|s| s.cpu_percent),
            memory_mb: stats.map(|s| s.memory_mb),
        };

        let attribute = !std::mem::take(&mut self.suspended);
        if let Some(prev) = self.last_snapshot.as_ref().filter(|_| attribute) {
            let elapsed = prev.seconds_until(now);

            if let Some(app) = prev.known_app() {
                *self.app_seconds.entry(app.to_string()).or_insert(0.0) += elapsed;
            }

            if self.settings.track_browser_url
                && elapsed > 0.0
                && prev.known_app() == Some(self.settings.browser_app.as_str())
            {
                if let Some(ref url) = self.prev_browser_url {
                    *self.url_seconds.entry(url.clone()).or_insert(0.0) += elapsed;
                }
            }
        }

        self.prev_browser_url = None;
        if self.settings.track_browser_url && browser_is_front {
            match browser_tab() {
                Ok(Some(tab)) if !is_internal_url(&tab.url) => {
                    let key = normalize_url(&tab.url);
                    if let Some(title) = tab.title {
                        self.url_titles.insert(key.clone(), title);
                    }
                    self.last_url = Some(key.clone());
                    self.prev_browser_url = Some(key);
                }
                Ok(_) => {}
                Err(e) => debug!("Browser tab query failed: {e}"),
            }
        }

        self.last_snapshot = Some(snapshot.clone());
        snapshot
    }

    /// Active app and, when it is the browser, the page being viewed.
    pub fn current_context(&self) -> CurrentContext {
        let Some(app) = self.last_snapshot.as_ref().and_then(|s| s.known_app()) else {
            return CurrentContext::default();
        };

        let mut context = CurrentContext {
            app: Some(app.to_string()),
            ..CurrentContext::default()
        };
        if app == self.settings.browser_app {
            if let Some(ref url) = self.last_url {
                context.title = self.url_titles.get(url).cloned();
                context.url = Some(url.clone());
            }
        }
        context
    }

    /// Session totals. Reading does not change the ledger.
    pub fn summary(&self) -> UsageSummary {
        let total_seconds = self
            .last_snapshot
            .as_ref()
            .map(|s| UsageSnapshot::new(self.session_start).seconds_until(s.timestamp))
            .unwrap_or(0.0);

        let browser_seen = !self.url_seconds.is_empty() || self.last_url.is_some();

        UsageSummary {
            session_start_ts: self.session_start.timestamp_millis() as f64 / 1000.0,
            total_seconds,
            app_seconds: self.app_seconds.clone(),
            last_app: self.last_snapshot.as_ref().and_then(|s| s.active_app.clone()),
            last_window_title: self
                .last_snapshot
                .as_ref()
                .and_then(|s| s.window_title.clone()),
            url_seconds: browser_seen.then(|| self.url_seconds.clone()),
            last_url: if browser_seen { self.last_url.clone() } else { None },
            url_titles: (browser_seen && !self.url_titles.is_empty())
                .then(|| self.url_titles.clone()),
        }
    }

    /// Stop attributing time until the next poll, e.g. while paused.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn last_snapshot(&self) -> Option<&UsageSnapshot> {
        self.last_snapshot.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const BROWSER: &str = "Google Chrome";

    fn t(start: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        start + Duration::seconds(secs)
    }

    fn no_tab() -> Result<Option<BrowserTab>, ActivityError> {
        Ok(None)
    }

    fn tab(url: &str, title: &str) -> Result<Option<BrowserTab>, ActivityError> {
        Ok(Some(BrowserTab {
            url: url.to_string(),
            title: Some(title.to_string()),
        }))
    }

    fn tracker(start: DateTime<Utc>) -> UsageTracker {
        UsageTracker::with_session_start(UsageSettings::default(), start)
    }

    struct ScriptedSource {
        foreground: Vec<Result<ForegroundApp, ActivityError>>,
    }

    impl ActivitySource for ScriptedSource {
        fn foreground(&mut self) -> Result<ForegroundApp, ActivityError> {
            self.foreground.remove(0)
        }

        fn browser_tab(&mut self, _browser_app: &str) -> Result<Option<BrowserTab>, ActivityError> {
            Ok(None)
        }
    }

    #[test]
    fn test_time_goes_to_previous_app() {
        let start = Utc::now();
        let mut tracker = tracker(start);

        tracker.record(t(start, 0), ForegroundApp::new("A", None), None, no_tab);
        tracker.record(t(start, 10), ForegroundApp::new("B", None), None, no_tab);
        let summary = tracker.summary();
        assert_eq!(summary.app_seconds.len(), 1);
        assert_eq!(summary.app_seconds["A"], 10.0);

        tracker.record(t(start, 15), ForegroundApp::new("B", None), None, no_tab);
        let summary = tracker.summary();
        assert_eq!(summary.app_seconds["A"], 10.0);
        assert_eq!(summary.app_seconds["B"], 5.0);
    }

    #[test]
    fn test_first_poll_accumulates_nothing() {
        let start = Utc::now();
        let mut tracker = tracker(start);
        tracker.record(t(start, 30), ForegroundApp::new("A", None), None, no_tab);
        assert!(tracker.summary().app_seconds.is_empty());
    }

    #[test]
    fn test_conservation_of_time() {
        let start = Utc::now();
        let mut tracker = tracker(start);
        let apps = [Some("A"), None, Some("B"), Some("A"), None, None, Some("C"), Some("B")];
        let times = [0, 3, 7, 20, 21, 40, 41, 50];

        let mut expected = 0.0;
        let mut prev: Option<(i64, Option<&str>)> = None;
        for (app, &secs) in apps.iter().zip(times.iter()) {
            let fg = match app {
                Some(name) => ForegroundApp::new(*name, None),
                None => ForegroundApp::unknown(),
            };
            tracker.record(t(start, secs), fg, None, no_tab);
            if let Some((prev_secs, Some(_))) = prev {
                expected += (secs - prev_secs) as f64;
            }
            prev = Some((secs, *app));
        }

        let summary = tracker.summary();
        let total: f64 = summary.app_seconds.values().sum();
        assert_eq!(total, expected);
        assert!(total <= summary.total_seconds);
        assert_eq!(summary.total_seconds, 50.0);
    }

    #[test]
    fn test_summary_is_idempotent() {
        let start = Utc::now();
        let mut tracker = tracker(start);
        tracker.record(t(start, 0), ForegroundApp::new(BROWSER, Some("Docs")), None, || {
            tab("https://example.com/a#x", "Example")
        });
        tracker.record(t(start, 12), ForegroundApp::new("Terminal", None), None, no_tab);

        let first = serde_json::to_string(&tracker.summary()).unwrap();
        let second = serde_json::to_string(&tracker.summary()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_url_time_and_fragment_merging() {
        let start = Utc::now();
        let mut tracker = tracker(start);
        let fg = || ForegroundApp::new(BROWSER, Some("Video"));

        tracker.record(t(start, 0), fg(), None, || tab("https://video.example/watch?v=1#t=5", "Clip"));
        tracker.record(t(start, 10), fg(), None, || {
            tab("https://video.example/watch?v=1#comments", "Clip (comments)")
        });
        tracker.record(t(start, 25), ForegroundApp::new("Mail", None), None, no_tab);

        let summary = tracker.summary();
        let urls = summary.url_seconds.unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls["https://video.example/watch?v=1"], 25.0);
        assert_eq!(summary.last_url.as_deref(), Some("https://video.example/watch?v=1"));
        assert_eq!(
            summary.url_titles.unwrap()["https://video.example/watch?v=1"],
            "Clip (comments)"
        );
        assert_eq!(summary.app_seconds[BROWSER], 25.0);
    }

    #[test]
    fn test_internal_pages_are_not_attributed() {
        let start = Utc::now();
        let mut tracker = tracker(start);
        let fg = || ForegroundApp::new(BROWSER, None);

        tracker.record(t(start, 0), fg(), None, || tab("https://a.example/", "A"));
        tracker.record(t(start, 5), fg(), None, || tab("chrome://settings/", "Settings"));
        tracker.record(t(start, 20), fg(), None, || tab("https://a.example/", "A"));

        let urls = tracker.summary().url_seconds.unwrap();
        // 0..5 on a.example, 5..20 on an internal page
        assert_eq!(urls["https://a.example/"], 5.0);
        assert_eq!(urls.len(), 1);
        assert!(!urls.keys().any(|k| k.starts_with("chrome")));
    }

    #[test]
    fn test_no_browser_fields_without_browser_activity() {
        let start = Utc::now();
        let mut tracker = tracker(start);
        tracker.record(t(start, 0), ForegroundApp::new("Finder", None), None, no_tab);
        let json = serde_json::to_value(tracker.summary()).unwrap();
        assert!(json.get("url_seconds").is_none());
        assert!(json.get("last_url").is_none());
        assert!(json["last_window_title"].is_null());
    }

    #[test]
    fn test_activity_query_failure_degrades_to_unknown() {
        let start = Utc::now();
        let mut tracker = tracker(start);
        let mut source = ScriptedSource {
            foreground: vec![
                Ok(ForegroundApp::new("A", None)),
                Err(ActivityError::QueryFailed("osascript exited 1".to_string())),
                Ok(ForegroundApp::new("A", None)),
            ],
        };

        tracker.poll_at(t(start, 0), &mut source);
        let failed = tracker.poll_at(t(start, 10), &mut source);
        assert_eq!(failed.active_app, None);
        tracker.poll_at(t(start, 30), &mut source);

        // 0..10 credited to A; the unknown 10..30 interval is dropped.
        let summary = tracker.summary();
        assert_eq!(summary.app_seconds["A"], 10.0);
        assert_eq!(summary.app_seconds.len(), 1);
        assert_eq!(summary.last_app.as_deref(), Some("A"));
    }

    #[test]
    fn test_context_only_carries_url_in_browser() {
        let start = Utc::now();
        let mut tracker = tracker(start);
        assert_eq!(tracker.current_context(), CurrentContext::default());

        tracker.record(t(start, 0), ForegroundApp::new(BROWSER, None), None, || {
            tab("https://forum.example/thread/9#reply", "Thread 9")
        });
        let ctx = tracker.current_context();
        assert_eq!(ctx.app.as_deref(), Some(BROWSER));
        assert_eq!(ctx.url.as_deref(), Some("https://forum.example/thread/9"));
        assert_eq!(ctx.title.as_deref(), Some("Thread 9"));

        tracker.record(t(start, 5), ForegroundApp::new("Notes", Some("todo")), None, no_tab);
        let ctx = tracker.current_context();
        assert_eq!(ctx.app.as_deref(), Some("Notes"));
        assert_eq!(ctx.url, None);
    }

    #[test]
    fn test_untracked_fields_are_dropped() {
        let start = Utc::now();
        let settings = UsageSettings {
            track_window_title: false,
            ..UsageSettings::default()
        };
        let mut tracker = UsageTracker::with_session_start(settings, start);
        let snap = tracker.record(
            t(start, 0),
            ForegroundApp::new("Editor", Some("secret.txt")),
            Some(ProcessStats {
                cpu_percent: 12.5,
                memory_mb: 300.0,
            }),
            no_tab,
        );
        assert_eq!(snap.active_app.as_deref(), Some("Editor"));
        assert_eq!(snap.window_title, None);
        assert_eq!(snap.cpu_percent, Some(12.5));
    }

    #[test]
    fn test_suspended_gap_is_not_attributed() {
        let start = Utc::now();
        let mut tracker = tracker(start);
        tracker.record(t(start, 0), ForegroundApp::new("A", None), None, no_tab);
        tracker.record(t(start, 10), ForegroundApp::new("A", None), None, no_tab);
        tracker.suspend();
        tracker.record(t(start, 600), ForegroundApp::new("A", None), None, no_tab);
        tracker.record(t(start, 610), ForegroundApp::new("B", None), None, no_tab);

        let summary = tracker.summary();
        assert_eq!(summary.app_seconds["A"], 20.0);
        assert_eq!(summary.total_seconds, 610.0);
    }
}
