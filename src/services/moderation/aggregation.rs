// Aggregation Logic
// Reconciles whichever stage resolved the review into one verdict

use crate::models::{DecidedBy, Decision, FeatureBundle, PolicyJudgement, Verdict};

pub const FAST_REJECT_CONFIDENCE: f64 = 0.9;
pub const FAST_ACCEPT_CONFIDENCE: f64 = 0.8;

const JUDGE_BASE_CONFIDENCE: f64 = 0.9;
const JUDGE_PENALTY_PER_FLAG: f64 = 0.1;
const JUDGE_CONFIDENCE_FLOOR: f64 = 0.5;
const JUDGE_VISIT_BONUS: f64 = 0.05;
const JUDGE_CONFIDENCE_CAP: f64 = 0.95;

const RULE_FALLBACK_EXPLANATION: &str = "Early decision by rules.";
const JUDGE_FALLBACK_EXPLANATION: &str = "Combined decision.";

/// The single source of the final decision. A judgement exists only on the LLM path.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    FastPath {
        stage: DecidedBy,
        decision: Decision,
        reason: Option<String>,
    },
    Judged(PolicyJudgement),
}

pub fn aggregate(features: FeatureBundle, resolution: Resolution) -> Verdict {
    match resolution {
        Resolution::FastPath {
            stage,
            decision,
            reason,
        } => Verdict {
            final_decision: decision,
            explanation: reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| RULE_FALLBACK_EXPLANATION.to_string()),
            confidence: fast_path_confidence(decision),
            features,
            llm_vote: None,
            decided_by: stage,
        },
        Resolution::Judged(vote) => {
            let final_decision = if vote.relevant {
                Decision::Relevant
            } else {
                Decision::NotRelevant
            };
            let explanation = if vote.reasoning.trim().is_empty() {
                JUDGE_FALLBACK_EXPLANATION.to_string()
            } else {
                vote.reasoning.clone()
            };
            Verdict {
                final_decision,
                explanation,
                confidence: judge_confidence(&vote),
                features,
                llm_vote: Some(vote),
                decided_by: DecidedBy::LlmJudge,
            }
        }
    }
}

pub fn fast_path_confidence(decision: Decision) -> f64 {
    match decision {
        Decision::NotRelevant => FAST_REJECT_CONFIDENCE,
        Decision::Relevant => FAST_ACCEPT_CONFIDENCE,
    }
}

/// 0.9 minus 0.1 per raised policy flag (floor 0.5), plus 0.05 for a likely
/// visit, capped at 0.95 and rounded to two decimals.
pub fn judge_confidence(vote: &PolicyJudgement) -> f64 {
    let penalties = vote.violations() as f64;
    let mut confidence = (JUDGE_BASE_CONFIDENCE - JUDGE_PENALTY_PER_FLAG * penalties).max(JUDGE_CONFIDENCE_FLOOR);
    if vote.visited.is_likely() {
        confidence += JUDGE_VISIT_BONUS;
    }
    round2(confidence.min(JUDGE_CONFIDENCE_CAP))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
