// reviewGuard Data Models
// Review input, derived features, stage outputs and the final verdict

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============ Review Record ============

/// One raw user review, kept as the opaque JSON object it arrived as.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewRecord(pub Map<String, Value>);

impl ReviewRecord {
    /// Build from any JSON value; non-objects yield an empty record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn has_text(&self) -> bool {
        self.0.get("text").map_or(false, |v| v.is_string())
    }

    /// Review text, trimmed. Missing or non-string text reads as empty.
    pub fn text(&self) -> &str {
        self.0
            .get("text")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("")
    }

    /// Raw `rating` value, passed through as received. `null` reads as absent.
    pub fn rating(&self) -> Option<Value> {
        self.0.get("rating").filter(|v| !v.is_null()).cloned()
    }

    /// Review timestamp in epoch milliseconds.
    pub fn time_ms(&self) -> Option<i64> {
        match self.0.get("time")? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Flattened photo URLs from `pics`.
    /// Each entry is `{"url": "..."}` or `{"url": ["...", ...]}`; bare strings are accepted too.
    pub fn pic_urls(&self) -> Vec<String> {
        let Some(Value::Array(pics)) = self.0.get("pics") else {
            return Vec::new();
        };

        let mut urls = Vec::new();
        for pic in pics {
            match pic {
                Value::String(s) if !s.trim().is_empty() => urls.push(s.clone()),
                Value::Object(obj) => match obj.get("url") {
                    Some(Value::String(s)) if !s.trim().is_empty() => urls.push(s.clone()),
                    Some(Value::Array(list)) => urls.extend(
                        list.iter()
                            .filter_map(Value::as_str)
                            .filter(|s| !s.trim().is_empty())
                            .map(str::to_string),
                    ),
                    _ => {}
                },
                _ => {}
            }
        }
        urls
    }
}

impl From<Value> for ReviewRecord {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

// ============ Feature Bundle ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBundle {
    pub text_len: usize,
    pub has_url: bool,
    pub url_count: usize,
    pub promo_keywords_found: Vec<String>,
    pub irrelevant_hints_found: Vec<String>,
    pub has_pics: bool,
    pub pics_count: usize,
    pub visit_markers_count: usize,
    pub likely_visited: bool,
    pub rating: Option<Value>,
    pub date_iso: Option<String>,
}

impl FeatureBundle {
    /// True when any advertisement signal (link or promotional term) is present.
    pub fn has_ad_signals(&self) -> bool {
        self.has_url || !self.promo_keywords_found.is_empty()
    }
}

// ============ Decisions ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Relevant,
    NotRelevant,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Relevant => "relevant",
            Decision::NotRelevant => "not_relevant",
        }
    }
}

/// Output of a fast deterministic stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageDecision {
    Decided {
        decision: Decision,
        reason: Option<String>,
    },
    /// Defer to the next stage.
    Undetermined,
}

impl StageDecision {
    pub fn relevant(reason: impl Into<String>) -> Self {
        Self::Decided {
            decision: Decision::Relevant,
            reason: Some(reason.into()),
        }
    }

    pub fn not_relevant(reason: impl Into<String>) -> Self {
        Self::Decided {
            decision: Decision::NotRelevant,
            reason: Some(reason.into()),
        }
    }

    pub fn decision(&self) -> Option<Decision> {
        match self {
            Self::Decided { decision, .. } => Some(*decision),
            Self::Undetermined => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Decided { reason, .. } => reason.as_deref(),
            Self::Undetermined => None,
        }
    }

    pub fn is_undetermined(&self) -> bool {
        matches!(self, Self::Undetermined)
    }
}

/// Pipeline stage that produced the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    RuleFilter,
    Heuristics,
    LlmJudge,
}

impl DecidedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecidedBy::RuleFilter => "rule_filter",
            DecidedBy::Heuristics => "heuristics",
            DecidedBy::LlmJudge => "llm_judge",
        }
    }
}

// ============ Policy Judgement ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Visited {
    Yes,
    Probably,
    Unclear,
    No,
}

impl Visited {
    pub fn is_likely(&self) -> bool {
        matches!(self, Visited::Yes | Visited::Probably)
    }
}

/// Structured verdict returned by the LLM judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PolicyJudgement {
    /// True if promotional or contains links/ads.
    pub advertisement: bool,
    /// True if content is not about the location.
    pub irrelevant: bool,
    /// True if it's a rant/complaint without evidence of visiting.
    pub rant_without_visit: bool,
    /// Did they likely visit?
    pub visited: Visited,
    /// Final judgement: passes all three policies.
    pub relevant: bool,
    /// Brief reason.
    pub reasoning: String,
}

impl PolicyJudgement {
    /// Number of policy flags raised.
    pub fn violations(&self) -> usize {
        [self.advertisement, self.irrelevant, self.rant_without_visit]
            .iter()
            .filter(|flag| **flag)
            .count()
    }
}

// ============ Verdict ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub final_decision: Decision,
    pub explanation: String,
    pub confidence: f64,
    pub features: FeatureBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_vote: Option<PolicyJudgement>,
    pub decided_by: DecidedBy,
}

// ============ Service Boundary ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub review: ReviewRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub model: String,
    pub final_decision: Decision,
    pub explanation: String,
    pub confidence: f64,
    pub features: FeatureBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_vote: Option<PolicyJudgement>,
    pub decided_by: DecidedBy,
}

impl ReviewResponse {
    pub fn from_verdict(model: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            model: model.into(),
            final_decision: verdict.final_decision,
            explanation: verdict.explanation,
            confidence: verdict.confidence,
            features: verdict.features,
            llm_vote: verdict.llm_vote,
            decided_by: verdict.decided_by,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_review_record_defaults() {
        let review = ReviewRecord::from_value(json!({"rating": 4}));
        assert_eq!(review.text(), "");
        assert!(!review.has_text());
        assert_eq!(review.rating(), Some(json!(4)));
        assert_eq!(review.time_ms(), None);
        assert!(review.pic_urls().is_empty());

        assert_eq!(ReviewRecord::from_value(json!({"rating": "5"})).rating(), Some(json!("5")));
        assert_eq!(ReviewRecord::from_value(json!({"rating": null})).rating(), None);

        let not_an_object = ReviewRecord::from_value(json!("hello"));
        assert!(not_an_object.0.is_empty());
    }

    #[test]
    fn test_pic_urls_flatten() {
        let review = ReviewRecord::from_value(json!({
            "pics": [
                {"url": ["http://img/1.jpg", "http://img/2.jpg"]},
                {"url": "http://img/3.jpg"},
                {"caption": "no url"},
                "http://img/4.jpg"
            ]
        }));
        assert_eq!(
            review.pic_urls(),
            vec!["http://img/1.jpg", "http://img/2.jpg", "http://img/3.jpg", "http://img/4.jpg"]
        );
    }

    #[test]
    fn test_blank_pic_urls_are_not_photos() {
        let review = ReviewRecord::from_value(json!({
            "pics": [{"url": ""}, {"url": ["", "  "]}, {"url": [7]}, "   "]
        }));
        assert!(review.pic_urls().is_empty());
    }

    #[test]
    fn test_policy_judgement_is_strict() {
        let missing = json!({"advertisement": false, "irrelevant": false});
        assert!(serde_json::from_value::<PolicyJudgement>(missing).is_err());

        let bad_enum = json!({
            "advertisement": false, "irrelevant": false, "rant_without_visit": false,
            "visited": "maybe", "relevant": true, "reasoning": "x"
        });
        assert!(serde_json::from_value::<PolicyJudgement>(bad_enum).is_err());

        let extra = json!({
            "advertisement": false, "irrelevant": false, "rant_without_visit": false,
            "visited": "yes", "relevant": true, "reasoning": "x", "score": 3
        });
        assert!(serde_json::from_value::<PolicyJudgement>(extra).is_err());
    }

    #[test]
    fn test_verdict_omits_absent_vote() {
        let verdict = Verdict {
            final_decision: Decision::NotRelevant,
            explanation: "x".to_string(),
            confidence: 0.9,
            features: FeatureBundle {
                text_len: 0,
                has_url: true,
                url_count: 1,
                promo_keywords_found: vec![],
                irrelevant_hints_found: vec![],
                has_pics: false,
                pics_count: 0,
                visit_markers_count: 0,
                likely_visited: false,
                rating: None,
                date_iso: None,
            },
            llm_vote: None,
            decided_by: DecidedBy::RuleFilter,
        };
        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(value["final_decision"], "not_relevant");
        assert_eq!(value["decided_by"], "rule_filter");
        assert!(value.get("llm_vote").is_none());
    }
}
