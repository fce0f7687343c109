// Heuristics
// Fast deterministic acceptance on photographic evidence

use crate::models::{FeatureBundle, StageDecision};

const PHOTO_EVIDENCE_REASON: &str = "Has photographic evidence and no advertisement signals.";

/// Accepts reviews with photos and no ad signals. Ad signals are re-checked
/// here so the stage holds on its own, not only after the rule filter.
pub fn heuristics_positive(features: &FeatureBundle) -> StageDecision {
    if features.has_pics && !features.has_url && features.promo_keywords_found.is_empty() {
        StageDecision::relevant(PHOTO_EVIDENCE_REASON)
    } else {
        StageDecision::Undetermined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;

    fn features(has_pics: bool, has_url: bool, promo: &[&str]) -> FeatureBundle {
        FeatureBundle {
            text_len: 2,
            has_url,
            url_count: usize::from(has_url),
            promo_keywords_found: promo.iter().map(|s| s.to_string()).collect(),
            irrelevant_hints_found: vec![],
            has_pics,
            pics_count: usize::from(has_pics),
            visit_markers_count: 0,
            likely_visited: has_pics,
            rating: None,
            date_iso: None,
        }
    }

    #[test]
    fn test_photos_without_ads_accept() {
        let decision = heuristics_positive(&features(true, false, &[]));
        assert_eq!(decision.decision(), Some(Decision::Relevant));
        assert_eq!(decision.reason(), Some(PHOTO_EVIDENCE_REASON));
    }

    #[test]
    fn test_rechecks_ad_signals() {
        assert!(heuristics_positive(&features(true, true, &[])).is_undetermined());
        assert!(heuristics_positive(&features(true, false, &["sale"])).is_undetermined());
    }

    #[test]
    fn test_no_photos_undetermined() {
        assert!(heuristics_positive(&features(false, false, &[])).is_undetermined());
    }
}
