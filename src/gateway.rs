//! Backend client for delivering agent events.
//!
//! Two event kinds leave the host: periodic `usage_summary` events and
//! `harmful_content_alert` events. Both share one envelope and are posted as
//! JSON to `{backend}/api/events`.

use crate::classifier::Category;
use crate::config::BackendSettings;
use crate::usage::{CurrentContext, UsageSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-request timeout for backend calls.
pub const BACKEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Backend connection settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL (scheme, host, port)
    pub url: String,
    /// Bearer token; empty means unauthenticated
    pub api_key: String,
}

impl BackendConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn from_settings(settings: &BackendSettings) -> Self {
        Self::new(settings.url.clone(), settings.api_key.clone())
    }

    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Event ingestion endpoint.
    pub fn events_url(&self) -> String {
        format!("{}/api/events", self.base())
    }

    /// Health check endpoint.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base())
    }
}

/// Gateway client error types.
#[derive(Debug)]
pub enum GatewayError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Backend answered with a status other than 200/201
    Rejected { status: u16, message: String },
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Config(msg) => write!(f, "Backend config error: {msg}"),
            GatewayError::Network(msg) => write!(f, "Backend network error: {msg}"),
            GatewayError::Rejected { status, message } => {
                write!(f, "Backend rejected event ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for GatewayError {}

/// Alert body for `harmful_content_alert` events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub categories: Vec<Category>,
    pub confidence: f64,
    pub details: Option<String>,
    pub app: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

impl AlertPayload {
    pub fn new(
        categories: Vec<Category>,
        confidence: f64,
        details: Option<String>,
        context: CurrentContext,
    ) -> Self {
        Self {
            categories,
            confidence,
            details,
            app: context.app,
            url: context.url,
            title: context.title,
        }
    }
}

/// Event type plus payload; serialized as `"type"` and `"payload"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    UsageSummary(UsageSummary),
    HarmfulContentAlert(AlertPayload),
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::UsageSummary(_) => "usage_summary",
            EventKind::HarmfulContentAlert(_) => "harmful_content_alert",
        }
    }
}

/// One outbound event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentEvent {
    pub device_id: String,
    /// Unix seconds
    pub timestamp: f64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl AgentEvent {
    pub fn new(device_id: impl Into<String>, at: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: at.timestamp_millis() as f64 / 1000.0,
            kind,
        }
    }

    pub fn usage_summary(
        device_id: impl Into<String>,
        at: DateTime<Utc>,
        summary: UsageSummary,
    ) -> Self {
        Self::new(device_id, at, EventKind::UsageSummary(summary))
    }

    pub fn alert(device_id: impl Into<String>, at: DateTime<Utc>, alert: AlertPayload) -> Self {
        Self::new(device_id, at, EventKind::HarmfulContentAlert(alert))
    }
}

/// Somewhere events can be delivered.
///
/// `dispatch` reports whether the receiver accepted the event and never
/// fails outright; delivery problems are logged by the implementation.
pub trait EventSink {
    fn dispatch(&mut self, event: &AgentEvent) -> bool;
}

/// Async client for the event backend.
pub struct BackendClient {
    config: BackendConfig,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(BACKEND_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Test connection to the backend.
    pub async fn test_connection(&self) -> Result<bool, GatewayError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Post one event. Only 200 and 201 count as accepted.
    pub async fn send_event(&self, event: &AgentEvent) -> Result<(), GatewayError> {
        let mut request = self.client.post(self.config.events_url()).json(event);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 200 || status == 201 {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(GatewayError::Rejected { status, message })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }
}

/// Blocking backend client for the single-threaded scheduler.
pub struct BlockingBackendClient {
    inner: BackendClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingBackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, GatewayError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: BackendClient::new(config)?,
            runtime,
        })
    }

    pub fn test_connection(&self) -> Result<bool, GatewayError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    pub fn send_event(&self, event: &AgentEvent) -> Result<(), GatewayError> {
        self.runtime.block_on(self.inner.send_event(event))
    }
}

impl EventSink for BlockingBackendClient {
    fn dispatch(&mut self, event: &AgentEvent) -> bool {
        match self.send_event(event) {
            Ok(()) => {
                debug!("Delivered {} event", event.kind.type_name());
                true
            }
            Err(e) => {
                warn!("Failed to deliver {} event: {e}", event.kind.type_name());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_backend_config_urls() {
        let config = BackendConfig::new("http://localhost:8000/", "");
        assert_eq!(config.events_url(), "http://localhost:8000/api/events");
        assert_eq!(config.health_url(), "http://localhost:8000/health");
    }

    #[test]
    fn test_usage_summary_event_shape() {
        let mut app_seconds = BTreeMap::new();
        app_seconds.insert("Safari".to_string(), 12.5);
        let summary = UsageSummary {
            session_start_ts: 1_700_000_000.0,
            total_seconds: 12.5,
            app_seconds,
            last_app: Some("Safari".to_string()),
            last_window_title: None,
            url_seconds: None,
            last_url: None,
            url_titles: None,
        };

        let event = AgentEvent::usage_summary("agent-test", at(1_700_000_012), summary);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["device_id"], "agent-test");
        assert_eq!(json["timestamp"], 1_700_000_012.0);
        assert_eq!(json["type"], "usage_summary");
        assert_eq!(json["payload"]["app_seconds"]["Safari"], 12.5);
        assert_eq!(json["payload"]["last_window_title"], serde_json::Value::Null);
        assert!(json["payload"].get("url_seconds").is_none());
    }

    #[test]
    fn test_alert_event_shape() {
        let context = CurrentContext {
            app: Some("Google Chrome".to_string()),
            url: Some("https://example.com/".to_string()),
            title: Some("Example".to_string()),
        };
        let alert = AlertPayload::new(
            vec![Category::SelfHarm, Category::Violence],
            0.93,
            Some("Text moderation: self_harm".to_string()),
            context,
        );

        let event = AgentEvent::alert("agent-test", at(1_700_000_000), alert);
        assert_eq!(event.kind.type_name(), "harmful_content_alert");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "harmful_content_alert");
        assert_eq!(
            json["payload"]["categories"],
            serde_json::json!(["self_harm", "violence"])
        );
        assert_eq!(json["payload"]["confidence"], 0.93);
        assert_eq!(json["payload"]["app"], "Google Chrome");
        assert_eq!(json["payload"]["title"], "Example");
    }

    #[test]
    fn test_unreachable_backend_is_not_accepted() {
        let mut client =
            BlockingBackendClient::new(BackendConfig::new("http://127.0.0.1:9", "key")).unwrap();
        let event = AgentEvent::alert(
            "agent-test",
            at(0),
            AlertPayload::new(vec![Category::Violence], 0.8, None, CurrentContext::default()),
        );
        assert!(!client.dispatch(&event));
    }
}
