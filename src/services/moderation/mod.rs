// Moderation Module
// Review relevance classification organized into specialized submodules:
// - terms: Configurable phrase tables and their compiled matchers
// - features: Derives the feature bundle from a raw review
// - rule_filter: Fast rejection of advertisement-like reviews
// - heuristics: Fast acceptance on photographic evidence
// - schema: Strict JSON schema for structured judge output
// - llm_judge: Schema-constrained LLM policy judgement
// - aggregation: Reconciles the deciding stage into one verdict
// - pipeline: Short-circuiting orchestration of the stages

pub mod terms;
pub mod features;
pub mod rule_filter;
pub mod heuristics;
pub mod schema;
pub mod llm_judge;
pub mod aggregation;
pub mod pipeline;

// Re-export commonly used items
pub use terms::{TermMatcher, TermTables};
pub use features::{ms_to_date, FeatureExtractor};
pub use rule_filter::rule_filter;
pub use heuristics::heuristics_positive;
pub use schema::{policy_judgement_schema, strict_schema};
pub use llm_judge::{HttpPolicyJudge, JudgeError, PolicyJudge};
pub use aggregation::{aggregate, fast_path_confidence, judge_confidence, Resolution};
pub use pipeline::{BatchError, PipelineStage, ReviewPipeline};
