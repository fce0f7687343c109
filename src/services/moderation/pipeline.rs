// Review Pipeline
// Short-circuiting flow: extract -> rule check -> heuristic check -> LLM judge -> aggregate

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::{DecidedBy, ReviewRecord, StageDecision, Verdict};

use super::aggregation::{aggregate, Resolution};
use super::features::FeatureExtractor;
use super::heuristics::heuristics_positive;
use super::llm_judge::{JudgeError, PolicyJudge};
use super::rule_filter::rule_filter;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PipelineStage {
    Extract,
    RuleCheck,
    HeuristicCheck,
    LlmJudge,
    Aggregate,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Extract => "extract",
            PipelineStage::RuleCheck => "rule_check",
            PipelineStage::HeuristicCheck => "heuristic_check",
            PipelineStage::LlmJudge => "llm_judge",
            PipelineStage::Aggregate => "aggregate",
        }
    }
}

/// Per-review failure in a batch. A task failure (panic or cancellation) is
/// kept apart from judge errors and is never retryable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error(transparent)]
    Judge(#[from] JudgeError),
    #[error("classification task failed: {0}")]
    TaskFailed(String),
}

impl BatchError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BatchError::Judge(e) => e.is_retryable(),
            BatchError::TaskFailed(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BatchError::Judge(e) => e.kind(),
            BatchError::TaskFailed(_) => "task_failed",
        }
    }
}

/// Stateless classifier; clones share the term matcher and judge.
#[derive(Clone)]
pub struct ReviewPipeline {
    extractor: FeatureExtractor,
    judge: Arc<dyn PolicyJudge>,
}

impl ReviewPipeline {
    pub fn new(extractor: FeatureExtractor, judge: Arc<dyn PolicyJudge>) -> Self {
        Self { extractor, judge }
    }

    pub fn model_id(&self) -> &str {
        self.judge.model_id()
    }

    /// Classify one review. Returns exactly one verdict, or the judge's error when
    /// the LLM stage was needed and failed.
    pub async fn classify(&self, review: &ReviewRecord) -> Result<Verdict, JudgeError> {
        let started = Instant::now();

        transition(PipelineStage::Extract, PipelineStage::RuleCheck);
        let features = self.extractor.extract(review);

        let resolution = if let Some(resolution) =
            fast_resolution(DecidedBy::RuleFilter, rule_filter(&features))
        {
            transition(PipelineStage::RuleCheck, PipelineStage::Aggregate);
            resolution
        } else if let Some(resolution) =
            fast_resolution(DecidedBy::Heuristics, heuristics_positive(&features))
        {
            transition(PipelineStage::RuleCheck, PipelineStage::HeuristicCheck);
            transition(PipelineStage::HeuristicCheck, PipelineStage::Aggregate);
            resolution
        } else {
            transition(PipelineStage::RuleCheck, PipelineStage::HeuristicCheck);
            transition(PipelineStage::HeuristicCheck, PipelineStage::LlmJudge);
            let vote = self.judge.judge(review, &features).await.map_err(|e| {
                warn!(kind = e.kind(), error = %e, "review classification aborted");
                e
            })?;
            transition(PipelineStage::LlmJudge, PipelineStage::Aggregate);
            Resolution::Judged(vote)
        };

        let verdict = aggregate(features, resolution);
        info!(
            decided_by = verdict.decided_by.as_str(),
            decision = verdict.final_decision.as_str(),
            confidence = verdict.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "review classified"
        );
        Ok(verdict)
    }

    /// Classify many reviews with at most `max_concurrency` in flight.
    /// Results keep input order.
    pub async fn classify_batch(
        &self,
        reviews: Vec<ReviewRecord>,
        max_concurrency: usize,
    ) -> Vec<Result<Verdict, BatchError>> {
        let total = reviews.len();
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));

        let handles: Vec<JoinHandle<Result<Verdict, BatchError>>> = reviews
            .into_iter()
            .map(|review| {
                let pipeline = self.clone();
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|_| BatchError::TaskFailed("semaphore closed".to_string()))?;
                    Ok::<_, BatchError>(pipeline.classify(&review).await?)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(total);
        for (idx, handle) in handles.into_iter().enumerate() {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(index = idx, error = %e, "classification task failed");
                    Err(BatchError::TaskFailed(e.to_string()))
                }
            };
            results.push(outcome);
            let done = idx + 1;
            if done == total || done % 10 == 0 {
                info!(done, total, "batch progress");
            }
        }
        results
    }
}

fn fast_resolution(stage: DecidedBy, decision: StageDecision) -> Option<Resolution> {
    match decision {
        StageDecision::Decided { decision, reason } => Some(Resolution::FastPath {
            stage,
            decision,
            reason,
        }),
        StageDecision::Undetermined => None,
    }
}

fn transition(from: PipelineStage, to: PipelineStage) {
    debug!(from = from.as_str(), to = to.as_str(), "pipeline transition");
}
