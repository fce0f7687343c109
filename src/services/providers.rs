// AI Provider Service
// OpenAI-compatible chat completions with schema-constrained output

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::HttpError(e) if e.is_timeout())
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat<'a> {
    r#type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Clone, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
}

/// A chat request whose answer must conform to `schema`.
#[derive(Debug, Clone)]
pub struct StructuredChat<'a> {
    pub model: &'a str,
    pub system: &'a str,
    pub user: &'a str,
    pub max_tokens: u32,
    pub temperature: f64,
    pub schema_name: &'a str,
    pub schema: &'a serde_json::Value,
}

pub struct ProviderClient {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl ProviderClient {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    pub async fn call_structured(&self, chat: &StructuredChat<'_>) -> Result<ChatResult, ProviderError> {
        let request = ChatRequest {
            model: chat.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: chat.system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: chat.user.to_string(),
                },
            ],
            max_tokens: chat.max_tokens,
            temperature: chat.temperature,
            response_format: ResponseFormat {
                r#type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: chat.schema_name,
                    strict: true,
                    schema: chat.schema,
                },
            },
        };

        let start = Instant::now();

        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = self.api_key.as_deref() {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult { content, latency_ms })
    }
}
