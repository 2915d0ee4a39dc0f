//! Configuration for the Safety Sensor Agent.

use crate::classifier::Category;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides `backend.api_key`.
pub const BACKEND_API_KEY_ENV: &str = "BACKEND_API_KEY";

/// Environment variable that overrides `classifier.openai_api_key`.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const REDACTED: &str = "<redacted>";

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identifier reported with every event. Derived from the hostname when unset.
    pub device_id: Option<String>,

    /// Event collector settings
    pub backend: BackendSettings,

    /// Screen capture settings
    pub capture: CaptureSettings,

    /// Content classification settings
    pub classifier: ClassifierSettings,

    /// Usage tracking settings
    pub usage: UsageSettings,

    /// Path for storing state and transparency logs
    pub data_path: PathBuf,

    /// Whether the agent is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("safety-sensor-agent");

        Self {
            device_id: None,
            backend: BackendSettings::default(),
            capture: CaptureSettings::default(),
            classifier: ClassifierSettings::default(),
            usage: UsageSettings::default(),
            data_path: data_dir,
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(config_path: &std::path::Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Set the `paused` flag in the file at `config_path`.
    ///
    /// A file that cannot be read or parsed is left untouched.
    pub fn set_paused_at(config_path: &std::path::Path, paused: bool) -> Result<(), ConfigError> {
        let mut config = Self::load_from(config_path)?;
        config.paused = paused;
        config.save_to(config_path)
    }

    /// Copy with non-empty secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for secret in [
            &mut config.backend.api_key,
            &mut config.classifier.openai_api_key,
        ] {
            if !secret.is_empty() {
                *secret = REDACTED.to_string();
            }
        }
        config
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("safety-sensor-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(ref dir) = self.capture.screenshot_dir {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    /// Replace secrets with values from the environment when present.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var(BACKEND_API_KEY_ENV).ok(),
            std::env::var(OPENAI_API_KEY_ENV).ok(),
        );
    }

    fn apply_overrides(&mut self, backend_key: Option<String>, openai_key: Option<String>) {
        if let Some(key) = backend_key.filter(|k| !k.trim().is_empty()) {
            self.backend.api_key = key;
        }
        if let Some(key) = openai_key.filter(|k| !k.trim().is_empty()) {
            self.classifier.openai_api_key = key;
        }
    }

    /// Device identifier reported with every event.
    pub fn resolved_device_id(&self) -> String {
        if let Some(id) = self.device_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return id.to_string();
        }
        match hostname::get() {
            Ok(h) => format!("agent-{}", h.to_string_lossy()),
            Err(_) => format!("agent-{}", &uuid::Uuid::new_v4().to_string()[..8]),
        }
    }
}

/// Where events are delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Base URL of the event collector
    pub url: String,
    /// Bearer token (empty for none)
    pub api_key: String,
    /// How often a usage summary is uploaded
    #[serde(with = "duration_serde")]
    pub upload_interval: Duration,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            api_key: String::new(),
            upload_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub enabled: bool,
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    /// Run the classifier on every Nth capture only
    pub classifier_run_every_n: u32,
    /// Keep every captured frame as a PNG in this directory
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            classifier_run_every_n: 1,
            screenshot_dir: None,
        }
    }
}

impl CaptureSettings {
    /// Down-sampling factor, never below one.
    pub fn run_every_n(&self) -> u32 {
        self.classifier_run_every_n.max(1)
    }
}

/// Which classification strategy to build.
///
/// Names are matched case-insensitively. A name outside the known set is
/// kept as [`ProviderKind::Unknown`] so the rest of the file still loads;
/// the classifier is then switched off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderKind {
    /// Remote text moderation plus optional vision
    OpenAi,
    /// Local keyword blocklist over OCR text
    Keyword,
    /// Unrecognised provider name, as written in the file
    Unknown(String),
}

impl ProviderKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "openai" | "remote" => ProviderKind::OpenAi,
            "keyword" | "local" => ProviderKind::Keyword,
            _ => ProviderKind::Unknown(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Keyword => "keyword",
            ProviderKind::Unknown(name) => name,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProviderKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub enabled: bool,
    pub provider: ProviderKind,
    pub openai_api_key: String,
    pub openai_base_url: String,
    /// Submit the screenshot to the vision model when text is clean
    pub use_vision: bool,
    pub vision_model: String,
    /// Minimum time between two alerts of the same category
    #[serde(with = "duration_serde")]
    pub alert_cooldown: Duration,
    pub confidence_threshold: f64,
    /// Category names to check (subset of the built-in taxonomy)
    pub categories: Option<Vec<String>>,
    /// Per-category phrase lists replacing the built-in blocklist
    pub keywords: Option<BTreeMap<String, Vec<String>>>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: ProviderKind::OpenAi,
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com".to_string(),
            use_vision: true,
            vision_model: "gpt-4o-mini".to_string(),
            alert_cooldown: Duration::from_secs(300),
            confidence_threshold: 0.7,
            categories: None,
            keywords: None,
        }
    }
}

impl ClassifierSettings {
    /// Resolve configured category names against the closed taxonomy.
    ///
    /// Unknown names are skipped with a warning; an absent list means all.
    pub fn resolved_categories(&self) -> Vec<Category> {
        match self.categories {
            None => Category::ALL.to_vec(),
            Some(ref names) => {
                let mut out = Vec::new();
                for name in names {
                    match name.parse::<Category>() {
                        Ok(cat) if !out.contains(&cat) => out.push(cat),
                        Ok(_) => {}
                        Err(_) => tracing::warn!(category = %name, "Ignoring unknown category"),
                    }
                }
                out
            }
        }
    }

    /// Whether the remote provider has what it needs to run.
    pub fn has_credentials(&self) -> bool {
        !self.openai_api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageSettings {
    pub track_active_app: bool,
    pub track_window_title: bool,
    pub track_cpu_memory: bool,
    pub track_browser_url: bool,
    /// Application name whose active tab is tracked
    pub browser_app: String,
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            track_active_app: true,
            track_window_title: true,
            track_cpu_memory: false,
            track_browser_url: true,
            browser_app: "Google Chrome".to_string(),
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.upload_interval, Duration::from_secs(60));
        assert_eq!(config.capture.interval, Duration::from_secs(60));
        assert_eq!(config.usage.poll_interval, Duration::from_secs(10));
        assert_eq!(config.classifier.alert_cooldown, Duration::from_secs(300));
        assert_eq!(config.classifier.provider, ProviderKind::OpenAi);
        assert!(!config.paused);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "backend": { "url": "https://collector.example", "upload_interval": 120 },
            "classifier": { "provider": "keyword" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.backend.url, "https://collector.example");
        assert_eq!(config.backend.upload_interval, Duration::from_secs(120));
        assert_eq!(config.classifier.provider, ProviderKind::Keyword);
        assert_eq!(config.capture.interval, Duration::from_secs(60));
        assert!(config.usage.track_browser_url);
    }

    #[test]
    fn test_run_every_n_floor() {
        let mut capture = CaptureSettings::default();
        capture.classifier_run_every_n = 0;
        assert_eq!(capture.run_every_n(), 1);
        capture.classifier_run_every_n = 3;
        assert_eq!(capture.run_every_n(), 3);
    }

    #[test]
    fn test_resolved_categories_skips_unknown() {
        let mut settings = ClassifierSettings::default();
        assert_eq!(settings.resolved_categories(), Category::ALL.to_vec());

        settings.categories = Some(vec![
            "self_harm".to_string(),
            "spam".to_string(),
            "self_harm".to_string(),
        ]);
        assert_eq!(settings.resolved_categories(), vec![Category::SelfHarm]);
    }

    #[test]
    fn test_env_overrides_replace_secrets() {
        let mut config = Config::default();
        config.backend.api_key = "file-key".to_string();
        config.apply_overrides(Some("env-key".to_string()), Some("  ".to_string()));
        assert_eq!(config.backend.api_key, "env-key");
        assert!(!config.classifier.has_credentials());

        config.apply_overrides(None, Some("sk-test".to_string()));
        assert_eq!(config.backend.api_key, "env-key");
        assert!(config.classifier.has_credentials());
    }

    #[test]
    fn test_save_and_load_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.device_id = Some("kid-laptop".to_string());
        config.paused = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.device_id.as_deref(), Some("kid-laptop"));
        assert!(loaded.paused);
        assert_eq!(loaded.resolved_device_id(), "kid-laptop");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.capture.enabled);
    }

    #[test]
    fn test_provider_names_are_case_insensitive() {
        for (name, expected) in [
            ("OpenAI", ProviderKind::OpenAi),
            ("Remote", ProviderKind::OpenAi),
            ("KEYWORD", ProviderKind::Keyword),
            (" local ", ProviderKind::Keyword),
        ] {
            let json = format!(r#"{{"classifier": {{"provider": "{name}"}}}}"#);
            let config: Config = serde_json::from_str(&json).unwrap();
            assert_eq!(config.classifier.provider, expected, "provider {name:?}");
        }
    }

    #[test]
    fn test_unknown_provider_keeps_rest_of_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"device_id":"kid-laptop","backend":{"url":"https://collector.example"},"classifier":{"provider":"anthropic"}}"#,
        )
        .unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.device_id.as_deref(), Some("kid-laptop"));
        assert_eq!(loaded.backend.url, "https://collector.example");
        assert_eq!(
            loaded.classifier.provider,
            ProviderKind::Unknown("anthropic".to_string())
        );

        // Saved back unchanged.
        loaded.save_to(&path).unwrap();
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.classifier.provider.as_str(), "anthropic");
    }

    #[test]
    fn test_set_paused_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.backend.url = "https://collector.example".to_string();
        config.save_to(&path).unwrap();

        Config::set_paused_at(&path, true).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.paused);
        assert_eq!(loaded.backend.url, "https://collector.example");
    }

    #[test]
    fn test_set_paused_leaves_broken_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let broken = r#"{"backend": {"url": "https://collector.example", "upload_interval": "soon"}}"#;
        std::fs::write(&path, broken).unwrap();

        let result = Config::set_paused_at(&path, true);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), broken);
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = Config::default();
        config.backend.api_key = "backend-secret".to_string();
        let redacted = config.redacted();
        assert_eq!(redacted.backend.api_key, "<redacted>");
        assert_eq!(redacted.classifier.openai_api_key, "");
        assert_eq!(config.backend.api_key, "backend-secret");

        let json = serde_json::to_string(&redacted).unwrap();
        assert!(!json.contains("backend-secret"));
    }
}
