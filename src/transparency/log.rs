//! Transparency log.
//!
//! Counts what the agent did (polls, uploads, captures, classifications and
//! alerts) so the user can audit it with `safety-sensor status`. Counts are
//! persisted between runs; no captured content is ever written here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the agent.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Usage polls taken
    polls: AtomicU64,
    /// Usage summaries accepted by the backend
    uploads_sent: AtomicU64,
    /// Usage summaries the backend did not accept
    uploads_failed: AtomicU64,
    /// Screen captures taken
    captures: AtomicU64,
    /// Captures run through the classifier
    classifications: AtomicU64,
    /// Alerts accepted by the backend
    alerts_sent: AtomicU64,
    /// Alerts the backend did not accept
    alerts_failed: AtomicU64,
    /// Flagged results held back by the cooldown
    alerts_suppressed: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            polls: AtomicU64::new(0),
            uploads_sent: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
            captures: AtomicU64::new(0),
            classifications: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
            alerts_failed: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log backed by `path`, picking up counts from a previous run.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one usage upload.
    pub fn record_upload(&self, accepted: bool) {
        if accepted {
            self.uploads_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.uploads_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_capture(&self) {
        self.captures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification(&self) {
        self.classifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one alert dispatch.
    pub fn record_alert(&self, delivered: bool) {
        if delivered {
            self.alerts_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.alerts_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_alert_suppressed(&self) {
        self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            polls: self.polls.load(Ordering::Relaxed),
            uploads_sent: self.uploads_sent.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            captures: self.captures.load(Ordering::Relaxed),
            classifications: self.classifications.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Agent Statistics:\n\
             - Usage polls: {}\n\
             - Usage summaries sent: {} ({} failed)\n\
             - Screen captures: {}\n\
             - Captures classified: {}\n\
             - Alerts sent: {} ({} failed)\n\
             - Alerts suppressed by cooldown: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Data Handling:\n\
             - Screenshots are analysed in memory and not uploaded\n\
             - Only usage totals and alert categories leave this device",
            stats.polls,
            stats.uploads_sent,
            stats.uploads_failed,
            stats.captures,
            stats.classifications,
            stats.alerts_sent,
            stats.alerts_failed,
            stats.alerts_suppressed,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                polls: stats.polls,
                uploads_sent: stats.uploads_sent,
                uploads_failed: stats.uploads_failed,
                captures: stats.captures,
                classifications: stats.classifications,
                alerts_sent: stats.alerts_sent,
                alerts_failed: stats.alerts_failed,
                alerts_suppressed: stats.alerts_suppressed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.polls.store(persisted.polls, Ordering::Relaxed);
                self.uploads_sent
                    .store(persisted.uploads_sent, Ordering::Relaxed);
                self.uploads_failed
                    .store(persisted.uploads_failed, Ordering::Relaxed);
                self.captures.store(persisted.captures, Ordering::Relaxed);
                self.classifications
                    .store(persisted.classifications, Ordering::Relaxed);
                self.alerts_sent
                    .store(persisted.alerts_sent, Ordering::Relaxed);
                self.alerts_failed
                    .store(persisted.alerts_failed, Ordering::Relaxed);
                self.alerts_suppressed
                    .store(persisted.alerts_suppressed, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.polls,
            &self.uploads_sent,
            &self.uploads_failed,
            &self.captures,
            &self.classifications,
            &self.alerts_sent,
            &self.alerts_failed,
            &self.alerts_suppressed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub polls: u64,
    pub uploads_sent: u64,
    pub uploads_failed: u64,
    pub captures: u64,
    pub classifications: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub alerts_suppressed: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    polls: u64,
    #[serde(default)]
    uploads_sent: u64,
    #[serde(default)]
    uploads_failed: u64,
    #[serde(default)]
    captures: u64,
    #[serde(default)]
    classifications: u64,
    #[serde(default)]
    alerts_sent: u64,
    #[serde(default)]
    alerts_failed: u64,
    #[serde(default)]
    alerts_suppressed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
