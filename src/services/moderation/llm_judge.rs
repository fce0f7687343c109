// LLM Judge
// Schema-constrained policy judgement for reviews the fast stages cannot resolve

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{FeatureBundle, PolicyJudgement, ReviewRecord};
use crate::services::config_store::JudgeConfig;
use crate::services::providers::{ProviderClient, ProviderError, StructuredChat};

use super::schema::{policy_judgement_schema, POLICY_JUDGEMENT_SCHEMA_NAME};

/// Fixed for deterministic judgements.
pub const JUDGE_TEMPERATURE: f64 = 0.0;

pub const JUDGE_SYSTEM_PROMPT: &str = "You are a precise content-moderation judge for Google location reviews.
Policies:
1) No Advertisement: reject if promotional or contains links.
2) No Irrelevant Content: reject if not about the specific location.
3) No Rant Without Visit: complaints require evidence of an actual visit (textual cues or photos).
Return a strict JSON object following the provided schema.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JudgeError {
    #[error("judge call timed out after {0:?}")]
    Timeout(Duration),
    #[error("judge transport error: {0}")]
    Transport(String),
    #[error("judge response violates PolicyJudgement schema: {0}")]
    SchemaViolation(String),
}

impl JudgeError {
    /// Timeouts and transport failures may succeed on retry; a schema violation at
    /// temperature 0 will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JudgeError::Timeout(_) | JudgeError::Transport(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JudgeError::Timeout(_) => "judge_timeout",
            JudgeError::Transport(_) => "judge_transport_error",
            JudgeError::SchemaViolation(_) => "judge_schema_violation",
        }
    }
}

#[async_trait]
pub trait PolicyJudge: Send + Sync {
    /// Backend identifier reported alongside verdicts.
    fn model_id(&self) -> &str;

    async fn judge(
        &self,
        review: &ReviewRecord,
        features: &FeatureBundle,
    ) -> Result<PolicyJudgement, JudgeError>;
}

/// Judge backed by an OpenAI-compatible chat-completions endpoint.
pub struct HttpPolicyJudge {
    client: ProviderClient,
    config: JudgeConfig,
    schema: Value,
}

impl HttpPolicyJudge {
    pub fn new(config: JudgeConfig) -> Result<Self, ProviderError> {
        let config = config.bounded();
        let client = ProviderClient::new(
            config.base_url.clone(),
            config.api_token.clone(),
            config.timeout(),
        )?;
        Ok(Self {
            client,
            config,
            schema: policy_judgement_schema(),
        })
    }
}

#[async_trait]
impl PolicyJudge for HttpPolicyJudge {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    async fn judge(
        &self,
        review: &ReviewRecord,
        features: &FeatureBundle,
    ) -> Result<PolicyJudgement, JudgeError> {
        let user_prompt = build_user_prompt(review, features);
        let chat = StructuredChat {
            model: &self.config.model_id,
            system: JUDGE_SYSTEM_PROMPT,
            user: &user_prompt,
            max_tokens: self.config.max_tokens,
            temperature: JUDGE_TEMPERATURE,
            schema_name: POLICY_JUDGEMENT_SCHEMA_NAME,
            schema: &self.schema,
        };

        let timeout = self.config.timeout();
        let result = match tokio::time::timeout(timeout, self.client.call_structured(&chat)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(model = %self.config.model_id, timeout_secs = timeout.as_secs(), "judge call timed out");
                return Err(JudgeError::Timeout(timeout));
            }
        };

        let chat_result = result.map_err(|e| {
            warn!(model = %self.config.model_id, error = %e, "judge call failed");
            if e.is_timeout() {
                JudgeError::Timeout(timeout)
            } else {
                JudgeError::Transport(e.to_string())
            }
        })?;

        info!(
            model = %self.config.model_id,
            latency_ms = chat_result.latency_ms,
            "judge call completed"
        );
        parse_judgement(&chat_result.content)
    }
}

/// User message carrying the review and its extracted features.
pub fn build_user_prompt(review: &ReviewRecord, features: &FeatureBundle) -> String {
    let features_json = serde_json::to_string(features).unwrap_or_else(|_| "{}".to_string());
    let review_json = serde_json::to_string(review).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Apply the policies exactly. Consider photos as strong evidence of visit.\n\n\
         review_record: {}\n\nextracted_features: {}",
        review_json, features_json
    )
}

/// Parse and validate judge output. Anything that is not a single JSON object
/// conforming to the schema is a violation.
pub fn parse_judgement(content: &str) -> Result<PolicyJudgement, JudgeError> {
    let json_str = extract_json(content)
        .ok_or_else(|| JudgeError::SchemaViolation(format!("no JSON object in response: {}", preview(content))))?;
    serde_json::from_str::<PolicyJudgement>(json_str)
        .map_err(|e| JudgeError::SchemaViolation(format!("{} - content: {}", e, preview(content))))
}

/// The content itself, or the body of a single ```json / ``` fence around it.
/// Any other surrounding text is rejected.
fn extract_json(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            let (opening, inner) = rest.split_once('\n')?;
            if !matches!(opening.trim(), "" | "json" | "JSON") {
                return None;
            }
            inner.trim_end().strip_suffix("```")?.trim()
        }
        None => trimmed,
    };
    (body.starts_with('{') && body.ends_with('}')).then_some(body)
}

fn preview(s: &str) -> String {
    const MAX_CHARS: usize = 200;
    let mut out: String = s.chars().take(MAX_CHARS).collect();
    if s.chars().count() > MAX_CHARS {
        out.push_str("...");
    }
    out
}

/// Request body the judge sends, exposed for diagnostics.
pub fn describe_request(config: &JudgeConfig) -> Value {
    json!({
        "url": config.base_url,
        "model": config.model_id,
        "temperature": JUDGE_TEMPERATURE,
        "max_tokens": config.max_tokens,
        "timeout_secs": config.timeout_secs,
        "response_format": {
            "type": "json_schema",
            "json_schema": {"name": POLICY_JUDGEMENT_SCHEMA_NAME, "strict": true, "schema": policy_judgement_schema()}
        }
    })
}
