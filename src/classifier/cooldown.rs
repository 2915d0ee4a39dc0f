//! Per-category alert cooldown.

use crate::classifier::types::Category;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// Maps each category to the instant after which it may alert again.
///
/// Expired entries are simply ignored; nothing is evicted.
#[derive(Debug, Default, Clone)]
pub struct CooldownRegistry {
    until: HashMap<Category, DateTime<Utc>>,
}

impl CooldownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `category` is still cooling down at `now`.
    pub fn is_suppressed(&self, category: Category, now: DateTime<Utc>) -> bool {
        self.until.get(&category).is_some_and(|until| now < *until)
    }

    /// Gate an alert for `categories`.
    ///
    /// Returns `true` (suppress) when any category is cooling down, leaving
    /// every timer untouched. Otherwise arms all of them for `window` and
    /// returns `false`.
    pub fn should_suppress(
        &mut self,
        categories: &[Category],
        window: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        if categories.iter().any(|c| self.is_suppressed(*c, now)) {
            return true;
        }

        let window = chrono::Duration::milliseconds(window.as_millis().min(i64::MAX as u128) as i64);
        let expiry = now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
        for category in categories {
            self.until.insert(*category, expiry);
        }
        false
    }

    /// Expiry currently recorded for `category`.
    pub fn expiry(&self, category: Category) -> Option<DateTime<Utc>> {
        self.until.get(&category).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn test_window_boundary() {
        let t = Utc::now();
        let mut registry = CooldownRegistry::new();
        let cats = [Category::Inappropriate];

        assert!(!registry.should_suppress(&cats, WINDOW, t));
        assert!(registry.should_suppress(&cats, WINDOW, t + chrono::Duration::seconds(299)));
        assert!(!registry.should_suppress(&cats, WINDOW, t + chrono::Duration::seconds(300)));
    }

    #[test]
    fn test_suppressed_call_does_not_extend() {
        let t = Utc::now();
        let mut registry = CooldownRegistry::new();
        let cats = [Category::Violence];

        registry.should_suppress(&cats, WINDOW, t);
        registry.should_suppress(&cats, WINDOW, t + chrono::Duration::seconds(100));
        assert_eq!(
            registry.expiry(Category::Violence),
            Some(t + chrono::Duration::seconds(300))
        );
    }

    #[test]
    fn test_any_cooling_category_suppresses_whole_alert() {
        let t = Utc::now();
        let mut registry = CooldownRegistry::new();

        registry.should_suppress(&[Category::SelfHarm], WINDOW, t);
        let both = [Category::SelfHarm, Category::BullyingHate];
        assert!(registry.should_suppress(&both, WINDOW, t + chrono::Duration::seconds(10)));

        // The suppressed alert did not arm bullying_hate.
        assert_eq!(registry.expiry(Category::BullyingHate), None);
        assert!(!registry.should_suppress(
            &[Category::BullyingHate],
            WINDOW,
            t + chrono::Duration::seconds(20)
        ));
    }

    #[test]
    fn test_categories_are_independent() {
        let t = Utc::now();
        let mut registry = CooldownRegistry::new();
        registry.should_suppress(&[Category::Inappropriate], WINDOW, t);
        assert!(registry.is_suppressed(Category::Inappropriate, t));
        assert!(!registry.is_suppressed(Category::Violence, t));
    }
}
