// reviewGuard Core Services

pub mod config_store;
pub mod providers;
pub mod moderation;

pub use config_store::*;
pub use providers::*;

pub use moderation::{
    aggregate,
    heuristics_positive,
    rule_filter,
    FeatureExtractor,
    HttpPolicyJudge,
    JudgeError,
    PolicyJudge,
    Resolution,
    ReviewPipeline,
    TermMatcher,
    TermTables,
};
