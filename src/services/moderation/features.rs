// Feature Extraction
// Derives the feature bundle consumed by every downstream stage

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::models::{FeatureBundle, ReviewRecord};

use super::terms::TermMatcher;

/// Visit-language markers needed to count as a likely visit without photos.
const VISIT_MARKER_THRESHOLD: usize = 2;

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    matcher: Arc<TermMatcher>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(Arc::new(TermMatcher::default()))
    }
}

impl FeatureExtractor {
    pub fn new(matcher: Arc<TermMatcher>) -> Self {
        Self { matcher }
    }

    /// Never fails: missing or malformed fields degrade to defaults.
    pub fn extract(&self, review: &ReviewRecord) -> FeatureBundle {
        if !review.has_text() {
            debug!("review has no text field, treating as empty (MalformedReview)");
        }
        let text = review.text();

        let url_count = self.matcher.url_count(text);
        let pics = review.pic_urls();
        let has_pics = !pics.is_empty();
        let visit_markers_count = self.matcher.visit_marker_count(text);

        FeatureBundle {
            text_len: text.chars().count(),
            has_url: url_count > 0,
            url_count,
            promo_keywords_found: self.matcher.promo_hits(text),
            irrelevant_hints_found: self.matcher.irrelevant_hits(text),
            has_pics,
            pics_count: pics.len(),
            visit_markers_count,
            likely_visited: has_pics || visit_markers_count >= VISIT_MARKER_THRESHOLD,
            rating: review.rating(),
            date_iso: review.time_ms().and_then(ms_to_date),
        }
    }
}

/// Epoch milliseconds to an RFC 3339 UTC timestamp; out-of-range values yield `None`.
pub fn ms_to_date(ms: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(value: serde_json::Value) -> FeatureBundle {
        FeatureExtractor::default().extract(&ReviewRecord::from_value(value))
    }

    #[test]
    fn test_promo_review_features() {
        let f = extract(json!({
            "text": "Use code SAVE20 at checkout! www.example.com",
            "pics": []
        }));
        assert!(f.has_url);
        assert_eq!(f.url_count, 1);
        assert_eq!(f.promo_keywords_found, vec!["use code"]);
        assert!(!f.has_pics);
        assert_eq!(f.pics_count, 0);
        assert!(f.has_ad_signals());
    }

    #[test]
    fn test_photo_counts_as_visit() {
        let f = extract(json!({"text": "ok", "pics": [{"url": ["http://img/1.jpg"]}]}));
        assert!(f.has_pics);
        assert_eq!(f.pics_count, 1);
        assert_eq!(f.visit_markers_count, 0);
        assert!(f.likely_visited);
        assert!(!f.has_url, "photo urls are not text links");
    }

    #[test]
    fn test_visit_language_threshold() {
        let one = extract(json!({"text": "Decent coffee."}));
        assert_eq!(one.visit_markers_count, 1);
        assert!(!one.likely_visited);

        let two = extract(json!({"text": "We ordered coffee."}));
        assert!(two.visit_markers_count >= 2);
        assert!(two.likely_visited);
    }

    #[test]
    fn test_missing_fields_degrade() {
        let f = extract(json!({"time": "not a time", "pics": null}));
        assert_eq!(f.text_len, 0);
        assert!(!f.has_url);
        assert!(f.promo_keywords_found.is_empty());
        assert!(!f.has_pics);
        assert_eq!(f.rating, None);
        assert_eq!(f.date_iso, None);
    }

    #[test]
    fn test_text_is_trimmed_and_counted_in_chars() {
        let f = extract(json!({"text": "  café  "}));
        assert_eq!(f.text_len, 4);
    }

    #[test]
    fn test_date_and_rating_passthrough() {
        let f = extract(json!({"text": "x", "rating": 3, "time": 1533121309821u64}));
        assert_eq!(f.rating, Some(json!(3)));

        let value = serde_json::to_value(&f).unwrap();
        assert_eq!(value["rating"], json!(3));

        let textual = extract(json!({"text": "x", "rating": "5"}));
        assert_eq!(textual.rating, Some(json!("5")));
        assert_eq!(f.date_iso.as_deref(), Some("2018-08-01T11:01:49.821+00:00"));
    }

    #[test]
    fn test_blank_photo_url_is_not_evidence() {
        let f = extract(json!({"text": "meh", "pics": [{"url": ""}]}));
        assert!(!f.has_pics);
        assert_eq!(f.pics_count, 0);
        assert!(!f.likely_visited);
    }

    #[test]
    fn test_out_of_range_time() {
        assert_eq!(ms_to_date(i64::MAX), None);
    }

    #[test]
    fn test_irrelevant_hints() {
        let f = extract(json!({"text": "We are hiring! Message me on WhatsApp."}));
        assert_eq!(f.irrelevant_hints_found, vec!["hiring", "whatsapp"]);
    }
}
