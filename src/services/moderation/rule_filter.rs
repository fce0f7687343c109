// Rule Filter
// Fast deterministic rejection of advertisement-like reviews

use crate::models::{FeatureBundle, StageDecision};

/// Rejects reviews carrying a web link or promotional terms. Never accepts.
pub fn rule_filter(features: &FeatureBundle) -> StageDecision {
    if !features.has_ad_signals() {
        return StageDecision::Undetermined;
    }

    let mut reasons = Vec::new();
    if features.has_url {
        reasons.push("contains web link".to_string());
    }
    if !features.promo_keywords_found.is_empty() {
        reasons.push(format!(
            "promotional terms: {}",
            features.promo_keywords_found.join(", ")
        ));
    }

    StageDecision::not_relevant(format!("Likely advertisement ({}).", reasons.join("; ")))
}
