//! Local keyword blocklist over OCR text. No network access.

use crate::classifier::types::{join_categories, Category, ClassificationResult};
use crate::classifier::ClassificationStrategy;
use image::DynamicImage;
use std::collections::BTreeMap;

/// Built-in sample blocklist; replaced wholesale by `classifier.keywords`.
pub fn default_keywords() -> BTreeMap<Category, Vec<String>> {
    let table: [(Category, &[&str]); 4] = [
        (
            Category::Inappropriate,
            &["porn", "xxx", "adult only", "nsfw", "nude", "naked"],
        ),
        (
            Category::Violence,
            &["kill yourself", "murder", "shoot them", "bomb", "terrorist"],
        ),
        (
            Category::SelfHarm,
            &["suicide", "cut myself", "self harm", "end my life", "kill myself"],
        ),
        (
            Category::BullyingHate,
            &[
                "hate you",
                "kill yourself",
                "die",
                "ugly",
                "fat",
                "stupid",
                "hate speech",
                "racist",
            ],
        ),
    ];
    table
        .into_iter()
        .map(|(cat, words)| (cat, words.iter().map(|w| w.to_string()).collect()))
        .collect()
}

/// Lowercase and collapse runs of whitespace to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Flags a category when any of its phrases occurs in the text.
pub struct LocalKeywordStrategy {
    blocklist: Vec<(Category, Vec<String>)>,
    threshold: f64,
}

impl LocalKeywordStrategy {
    /// Build from the enabled categories and an optional configured phrase table.
    ///
    /// Configured keys outside the taxonomy are dropped with a warning.
    pub fn new(
        categories: &[Category],
        keywords: Option<&BTreeMap<String, Vec<String>>>,
        threshold: f64,
    ) -> Self {
        let table = match keywords {
            Some(configured) => {
                let mut table = BTreeMap::new();
                for (name, phrases) in configured {
                    match name.parse::<Category>() {
                        Ok(cat) => {
                            table
                                .entry(cat)
                                .or_insert_with(Vec::new)
                                .extend(phrases.iter().cloned());
                        }
                        Err(e) => tracing::warn!("Ignoring keywords: {e}"),
                    }
                }
                table
            }
            None => default_keywords(),
        };

        let blocklist = categories
            .iter()
            .map(|cat| {
                let phrases = table
                    .get(cat)
                    .map(|p| {
                        p.iter()
                            .map(|w| normalize_text(w))
                            .filter(|w| !w.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
                (*cat, phrases)
            })
            .collect();

        Self {
            blocklist,
            threshold,
        }
    }

    pub fn check_text(&self, text: &str) -> ClassificationResult {
        let text = normalize_text(text);
        if text.is_empty() {
            return ClassificationResult::safe();
        }

        let matched: Vec<Category> = self
            .blocklist
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| text.contains(p.as_str())))
            .map(|(cat, _)| *cat)
            .collect();

        if matched.is_empty() {
            return ClassificationResult::safe();
        }
        let details = format!("Keyword match: {}", join_categories(&matched));
        ClassificationResult::from_categories(matched, self.threshold, Some(details))
    }
}

impl ClassificationStrategy for LocalKeywordStrategy {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn classify(&self, text: &str, _image: &DynamicImage) -> ClassificationResult {
        self.check_text(text)
    }
}
