//! Remote moderation: text moderation first, then optional image verdict.

use crate::classifier::types::{join_categories, Category, ClassificationResult};
use crate::classifier::ClassificationStrategy;
use image::DynamicImage;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Confidence reported for flagged text when the API gives lower scores.
const FLAGGED_TEXT_FLOOR: f64 = 0.9;

/// Longest vision answer kept in `details`.
const MAX_VERDICT_DETAILS: usize = 200;

/// Raw text-moderation answer, keyed by the API's category names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextModeration {
    pub categories: BTreeMap<String, bool>,
    pub category_scores: BTreeMap<String, f64>,
}

/// Remote classification capability.
pub trait ModerationApi {
    fn moderate_text(&self, text: &str) -> Result<TextModeration, ModerationError>;

    /// Free-text verdict for the image: `SAFE` or category words.
    fn classify_image(&self, image: &DynamicImage) -> Result<String, ModerationError>;
}

/// Errors from the moderation API.
#[derive(Debug)]
pub enum ModerationError {
    Config(String),
    Network(String),
    Api { status: u16, message: String },
    Decode(String),
    Encode(String),
}

impl std::fmt::Display for ModerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModerationError::Config(msg) => write!(f, "Moderation config error: {msg}"),
            ModerationError::Network(msg) => write!(f, "Moderation network error: {msg}"),
            ModerationError::Api { status, message } => {
                write!(f, "Moderation API error ({status}): {message}")
            }
            ModerationError::Decode(msg) => write!(f, "Moderation response error: {msg}"),
            ModerationError::Encode(msg) => write!(f, "Moderation encode error: {msg}"),
        }
    }
}

impl std::error::Error for ModerationError {}

/// Map an API category such as `self-harm/intent` onto the taxonomy.
pub fn map_api_category(name: &str) -> Option<Category> {
    match name.split('/').next().unwrap_or(name) {
        "sexual" => Some(Category::Inappropriate),
        "violence" => Some(Category::Violence),
        "self-harm" | "self_harm" => Some(Category::SelfHarm),
        "hate" | "harassment" => Some(Category::BullyingHate),
        _ => None,
    }
}

/// Convert a moderation answer, keeping only `enabled` categories.
pub fn moderation_to_result(moderation: &TextModeration, enabled: &[Category]) -> ClassificationResult {
    let flagged: Vec<Category> = moderation
        .categories
        .iter()
        .filter(|(_, hit)| **hit)
        .filter_map(|(name, _)| map_api_category(name))
        .filter(|cat| enabled.contains(cat))
        .collect();

    if flagged.is_empty() {
        return ClassificationResult::safe();
    }

    let confidence = moderation
        .category_scores
        .iter()
        .filter(|(name, _)| map_api_category(name).is_some())
        .map(|(_, score)| *score)
        .fold(FLAGGED_TEXT_FLOOR, f64::max);

    let mut result = ClassificationResult::from_categories(flagged, confidence, None);
    result.details = Some(format!(
        "Text moderation: {}",
        join_categories(&result.categories)
    ));
    result
}

/// Parse a vision verdict. Anything without `SAFE` or a category word is unusable.
pub fn parse_vision_verdict(
    answer: &str,
    threshold: f64,
    enabled: &[Category],
) -> ClassificationResult {
    let content = answer.trim().to_uppercase();
    if content.is_empty() {
        return ClassificationResult::failed("empty vision verdict");
    }

    let mut found = Vec::new();
    if content.contains("INAPPROPRIATE") {
        found.push(Category::Inappropriate);
    }
    if content.contains("VIOLENCE") {
        found.push(Category::Violence);
    }
    if ["SELF_HARM", "SELF-HARM", "SELF HARM"]
        .iter()
        .any(|w| content.contains(w))
    {
        found.push(Category::SelfHarm);
    }
    if content.contains("BULLYING") || content.contains("HATE") {
        found.push(Category::BullyingHate);
    }

    if found.is_empty() {
        if content.contains("SAFE") {
            return ClassificationResult::safe();
        }
        return ClassificationResult::failed("unrecognised vision verdict");
    }

    found.retain(|c| enabled.contains(c));
    if found.is_empty() {
        return ClassificationResult::safe();
    }
    let details: String = content.chars().take(MAX_VERDICT_DETAILS).collect();
    ClassificationResult::from_categories(found, threshold, Some(details))
}

/// Text moderation with a short-circuit, then the image verdict.
pub struct RemoteModerationStrategy<A: ModerationApi> {
    api: A,
    categories: Vec<Category>,
    threshold: f64,
    use_vision: bool,
}

impl<A: ModerationApi> RemoteModerationStrategy<A> {
    pub fn new(api: A, categories: Vec<Category>, threshold: f64, use_vision: bool) -> Self {
        Self {
            api,
            categories,
            threshold,
            use_vision,
        }
    }
}

impl<A: ModerationApi> ClassificationStrategy for RemoteModerationStrategy<A> {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn classify(&self, text: &str, image: &DynamicImage) -> ClassificationResult {
        let mut failures = Vec::new();

        if !text.is_empty() {
            match self.api.moderate_text(text) {
                Ok(moderation) => {
                    let result = moderation_to_result(&moderation, &self.categories);
                    if result.flagged {
                        return result;
                    }
                    debug!("Text moderation found nothing");
                }
                Err(e) => {
                    warn!("Text moderation failed: {e}");
                    failures.push(format!("text: {e}"));
                }
            }
        }

        if self.use_vision {
            match self.api.classify_image(image) {
                Ok(answer) => return parse_vision_verdict(&answer, self.threshold, &self.categories),
                Err(e) => {
                    warn!("Vision check failed: {e}");
                    failures.push(format!("vision: {e}"));
                }
            }
        }

        if failures.is_empty() {
            ClassificationResult::safe()
        } else {
            ClassificationResult::failed(failures.join("; "))
        }
    }
}
