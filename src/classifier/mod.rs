//! Harmful-content classification for captured frames.
//!
//! Every frame goes through the same pipeline: downscale, OCR, then one
//! [`ClassificationStrategy`]. The strategy is chosen once at construction:
//! [`LocalKeywordStrategy`] matches OCR text against a blocklist,
//! [`RemoteModerationStrategy`] asks a moderation API. Alerts are gated by a
//! per-category [`CooldownRegistry`].

pub mod cooldown;
pub mod keyword;
pub mod ocr;
pub mod openai;
pub mod preprocess;
pub mod remote;
pub mod types;

// Re-export commonly used types
pub use cooldown::CooldownRegistry;
pub use keyword::LocalKeywordStrategy;
pub use ocr::{NoOcr, OcrError, TesseractOcr, TextExtractor};
pub use openai::{OpenAiConfig, OpenAiModerationClient};
pub use preprocess::{downscale_for_analysis, MAX_ANALYSIS_SIDE};
pub use remote::{ModerationApi, ModerationError, RemoteModerationStrategy, TextModeration};
pub use types::{join_categories, Category, ClassificationResult};

use crate::config::{ClassifierSettings, ProviderKind};
use chrono::{DateTime, Utc};
use image::DynamicImage;
use std::time::Duration;
use tracing::{debug, warn};

/// The leaf step of the pipeline.
pub trait ClassificationStrategy {
    fn name(&self) -> &'static str;

    /// Classify a downscaled frame and its (possibly empty) OCR text.
    fn classify(&self, text: &str, image: &DynamicImage) -> ClassificationResult;
}

/// Downscale + OCR + strategy, plus the alert cooldown state.
pub struct ContentClassifier {
    strategy: Box<dyn ClassificationStrategy>,
    ocr: Box<dyn TextExtractor>,
    cooldown: CooldownRegistry,
    threshold: f64,
}

impl ContentClassifier {
    pub fn new(
        strategy: Box<dyn ClassificationStrategy>,
        ocr: Box<dyn TextExtractor>,
        threshold: f64,
    ) -> Self {
        Self {
            strategy,
            ocr,
            cooldown: CooldownRegistry::new(),
            threshold,
        }
    }

    /// Build the configured classifier with tesseract OCR.
    ///
    /// Returns `None` when classification is disabled, the provider is not
    /// recognised, or the remote provider has no credentials; the agent then
    /// runs without alerts.
    pub fn from_settings(settings: &ClassifierSettings) -> Option<Self> {
        Self::from_settings_with_ocr(settings, Box::new(TesseractOcr::new()))
    }

    pub fn from_settings_with_ocr(
        settings: &ClassifierSettings,
        ocr: Box<dyn TextExtractor>,
    ) -> Option<Self> {
        if !settings.enabled {
            return None;
        }

        let categories = settings.resolved_categories();
        let threshold = settings.confidence_threshold;

        let strategy: Box<dyn ClassificationStrategy> = match &settings.provider {
            ProviderKind::Unknown(name) => {
                warn!(provider = %name, "Unknown classifier provider; content classification disabled");
                return None;
            }
            ProviderKind::Keyword => Box::new(LocalKeywordStrategy::new(
                &categories,
                settings.keywords.as_ref(),
                threshold,
            )),
            ProviderKind::OpenAi => {
                if !settings.has_credentials() {
                    warn!("No OpenAI API key configured; content classification disabled");
                    return None;
                }
                let config = OpenAiConfig {
                    base_url: settings.openai_base_url.clone(),
                    api_key: settings.openai_api_key.clone(),
                    vision_model: settings.vision_model.clone(),
                };
                match OpenAiModerationClient::new(config) {
                    Ok(client) => Box::new(RemoteModerationStrategy::new(
                        client,
                        categories,
                        threshold,
                        settings.use_vision,
                    )),
                    Err(e) => {
                        warn!("Could not initialise moderation client: {e}");
                        return None;
                    }
                }
            }
        };

        Some(Self::new(strategy, ocr, threshold))
    }

    /// Classify one frame. Never fails; outages degrade to not-flagged.
    pub fn check(&self, image: &DynamicImage) -> ClassificationResult {
        let small = downscale_for_analysis(image);

        let text = match self.ocr.extract_text(&small) {
            Ok(text) => text,
            Err(e) => {
                debug!("OCR unavailable: {e}");
                String::new()
            }
        };

        self.strategy.classify(text.trim(), &small)
    }

    /// Cooldown gate for a flagged result; `true` means suppress.
    pub fn apply_cooldown(&mut self, categories: &[Category], window: Duration) -> bool {
        self.apply_cooldown_at(categories, window, Utc::now())
    }

    pub fn apply_cooldown_at(
        &mut self,
        categories: &[Category],
        window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        self.cooldown.should_suppress(categories, window, now)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Name of the active strategy.
    pub fn mode(&self) -> &'static str {
        self.strategy.name()
    }
}
