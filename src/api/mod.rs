// HTTP API
// /health and /predict over the review pipeline

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::models::{HealthResponse, ReviewRequest, ReviewResponse};
use crate::services::config_store::ServerConfig;
use crate::services::moderation::{JudgeError, ReviewPipeline};

#[derive(Clone)]
pub struct AppState {
    pipeline: ReviewPipeline,
    app_name: Arc<str>,
}

impl AppState {
    pub fn new(pipeline: ReviewPipeline, app_name: &str) -> Self {
        Self {
            pipeline,
            app_name: Arc::from(app_name),
        }
    }
}

/// Judge failures surfaced to clients; never replaced by a fabricated verdict.
#[derive(Debug)]
pub struct ApiError(pub JudgeError);

impl From<JudgeError> for ApiError {
    fn from(e: JudgeError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            JudgeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            JudgeError::Transport(_) | JudgeError::SchemaViolation(_) => StatusCode::BAD_GATEWAY,
        };
        let body = json!({"error": self.0.kind(), "message": self.0.to_string()});
        (status, Json(body)).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .with_state(state)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.pipeline.model_id().to_string(),
    })
}

pub async fn predict(
    State(state): State<AppState>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", %request_id, app = %state.app_name);

    async move {
        let verdict = state.pipeline.classify(&payload.review).await?;
        Ok::<_, ApiError>(Json(ReviewResponse::from_verdict(state.pipeline.model_id(), verdict)))
    }
    .instrument(span)
    .await
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: &ServerConfig, pipeline: ReviewPipeline) -> anyhow::Result<()> {
    let app = build_router(AppState::new(pipeline, &config.app_name));

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, app = %config.app_name, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, DecidedBy, FeatureBundle, PolicyJudgement, ReviewRecord};
    use crate::services::moderation::{FeatureExtractor, PolicyJudge};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    struct FailingJudge(JudgeError);

    #[async_trait]
    impl PolicyJudge for FailingJudge {
        fn model_id(&self) -> &str {
            "failing/judge"
        }

        async fn judge(&self, _: &ReviewRecord, _: &FeatureBundle) -> Result<PolicyJudgement, JudgeError> {
            Err(self.0.clone())
        }
    }

    fn state(err: JudgeError) -> AppState {
        let pipeline = ReviewPipeline::new(FeatureExtractor::default(), Arc::new(FailingJudge(err)));
        AppState::new(pipeline, "review-agent")
    }

    fn request(value: serde_json::Value) -> Json<ReviewRequest> {
        Json(serde_json::from_value(value).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_model() {
        let Json(body) = health(State(state(JudgeError::Transport("x".into())))).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.model, "failing/judge");
    }

    #[tokio::test]
    async fn test_predict_fast_path() {
        let s = state(JudgeError::Transport("unused".into()));
        let Json(resp) = predict(State(s), request(json!({"review": {"text": "ok", "pics": [{"url": ["http://img/1.jpg"]}]}})))
            .await
            .unwrap();
        assert_eq!(resp.model, "failing/judge");
        assert_eq!(resp.final_decision, Decision::Relevant);
        assert_eq!(resp.confidence, 0.8);
        assert_eq!(resp.decided_by, DecidedBy::Heuristics);

        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("llm_vote").is_none());
        assert_eq!(value["features"]["pics_count"], 1);
    }

    #[tokio::test]
    async fn test_predict_judge_timeout_maps_to_504() {
        let s = state(JudgeError::Timeout(Duration::from_secs(120)));
        let err = predict(State(s), request(json!({"review": {"text": "Awful, avoid."}})))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_predict_schema_violation_maps_to_502() {
        let s = state(JudgeError::SchemaViolation("not json".into()));
        let err = predict(State(s), request(json!({"review": {"text": "Meh"}})))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    fn post_predict(body: &'static str) -> Request<Body> {
        Request::post("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_router_rejects_malformed_bodies() {
        let app = build_router(state(JudgeError::Transport("unused".into())));

        let review_not_object = app.clone().oneshot(post_predict(r#"{"review": "text"}"#)).await.unwrap();
        assert!(review_not_object.status().is_client_error());

        let not_json = app.clone().oneshot(post_predict("this is not json")).await.unwrap();
        assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);

        let missing_review = app.oneshot(post_predict(r#"{"text": "hi"}"#)).await.unwrap();
        assert!(missing_review.status().is_client_error());
    }

    #[tokio::test]
    async fn test_router_serves_health_and_predict() {
        let app = build_router(state(JudgeError::Timeout(Duration::from_secs(1))));

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let predicted = app
            .clone()
            .oneshot(post_predict(r#"{"review": {"text": "Buy now at www.shop.example"}}"#))
            .await
            .unwrap();
        assert_eq!(predicted.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(predicted.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["final_decision"], "not_relevant");
        assert_eq!(body["decided_by"], "rule_filter");

        let timed_out = app.oneshot(post_predict(r#"{"review": {"text": "Meh."}}"#)).await.unwrap();
        assert_eq!(timed_out.status(), StatusCode::GATEWAY_TIMEOUT);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(timed_out.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["error"], "judge_timeout");
    }
}
