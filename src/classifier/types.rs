//! Category taxonomy and classification results.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Harmful-content categories. A closed set shared by every strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Inappropriate,
    Violence,
    SelfHarm,
    BullyingHate,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Inappropriate,
        Category::Violence,
        Category::SelfHarm,
        Category::BullyingHate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Inappropriate => "inappropriate",
            Category::Violence => "violence",
            Category::SelfHarm => "self_harm",
            Category::BullyingHate => "bullying_hate",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for names outside the taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl std::fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown category '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "inappropriate" => Ok(Category::Inappropriate),
            "violence" => Ok(Category::Violence),
            "self_harm" => Ok(Category::SelfHarm),
            "bullying_hate" => Ok(Category::BullyingHate),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// Outcome of classifying one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub flagged: bool,
    /// Matched categories in taxonomy order
    pub categories: Vec<Category>,
    /// 0.0 to 1.0
    pub confidence: f64,
    /// `None` means checked and safe
    pub details: Option<String>,
}

impl ClassificationResult {
    /// Checked, nothing found.
    pub fn safe() -> Self {
        Self {
            flagged: false,
            categories: Vec::new(),
            confidence: 0.0,
            details: None,
        }
    }

    /// The check could not be completed. Never flagged.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            details: Some(format!("check failed: {reason}")),
            ..Self::safe()
        }
    }

    /// Flagged when `categories` is non-empty; categories are sorted and deduplicated.
    pub fn from_categories(
        mut categories: Vec<Category>,
        confidence: f64,
        details: Option<String>,
    ) -> Self {
        categories.sort();
        categories.dedup();
        if categories.is_empty() {
            return Self::safe();
        }
        Self {
            flagged: true,
            categories,
            confidence: confidence.clamp(0.0, 1.0),
            details,
        }
    }

    /// Whether the check itself failed.
    pub fn is_failure(&self) -> bool {
        !self.flagged
            && self
                .details
                .as_deref()
                .is_some_and(|d| d.starts_with("check failed"))
    }

    /// Flagged with confidence at or above `threshold`.
    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.flagged && self.confidence >= threshold
    }
}

/// Join category names for log lines and details.
pub fn join_categories(categories: &[Category]) -> String {
    categories
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing() {
        assert_eq!("self_harm".parse::<Category>().unwrap(), Category::SelfHarm);
        assert_eq!("Self-Harm".parse::<Category>().unwrap(), Category::SelfHarm);
        assert_eq!(" violence ".parse::<Category>().unwrap(), Category::Violence);
        assert!("spam".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serializes_snake_case() {
        let json = serde_json::to_string(&vec![Category::BullyingHate, Category::SelfHarm]).unwrap();
        assert_eq!(json, r#"["bullying_hate","self_harm"]"#);
    }

    #[test]
    fn test_from_categories_orders_and_dedups() {
        let result = ClassificationResult::from_categories(
            vec![Category::SelfHarm, Category::Inappropriate, Category::SelfHarm],
            1.4,
            None,
        );
        assert!(result.flagged);
        assert_eq!(result.categories, vec![Category::Inappropriate, Category::SelfHarm]);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_failure_is_distinct_from_safe() {
        let safe = ClassificationResult::safe();
        let failed = ClassificationResult::failed("timeout");
        assert!(!safe.is_failure());
        assert!(failed.is_failure());
        assert!(!failed.flagged);
        assert_eq!(failed.details.as_deref(), Some("check failed: timeout"));
    }

    #[test]
    fn test_threshold() {
        let r = ClassificationResult::from_categories(vec![Category::Violence], 0.7, None);
        assert!(r.exceeds_threshold(0.7));
        assert!(!r.exceeds_threshold(0.71));
        assert!(!ClassificationResult::safe().exceeds_threshold(0.0));
    }
}
