//! RPC client seam. Production uses a messages-API HTTP client; tests and
//! partial pipeline runs script their own implementations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rate limited by provider")]
    RateLimited,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected provider response: {0}")]
    BadResponse(String),
}

#[async_trait]
pub trait ClassifierClient: Send + Sync {
    fn provider(&self) -> &str;

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ClientError>;
}

#[derive(Debug, Clone)]
pub struct MessagesApiSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl MessagesApiSettings {
    /// Reads `CLASSIFIER_API_KEY` (required) and `CLASSIFIER_API_URL`.
    pub fn from_env() -> Result<Self, String> {
        let api_key = std::env::var("CLASSIFIER_API_KEY")
            .map_err(|_| "CLASSIFIER_API_KEY is not set".to_string())?;
        let base_url = std::env::var("CLASSIFIER_API_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com".to_string());
        Ok(Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(120),
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageBody<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponseBody {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Anthropic-style messages endpoint. JSON in, JSON out; token usage comes
/// back in the `usage` block.
pub struct MessagesApiClient {
    settings: MessagesApiSettings,
    http: reqwest::Client,
}

impl MessagesApiClient {
    pub fn new(settings: MessagesApiSettings) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ClientError::Transport(err.to_string()))?;
        Ok(Self { settings, http })
    }
}

#[async_trait]
impl ClassifierClient for MessagesApiClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ClientError> {
        let url = format!("{}/v1/messages", self.settings.base_url.trim_end_matches('/'));
        let body = MessagesRequestBody {
            model: &request.model,
            max_tokens: request.max_tokens,
            messages: vec![MessageBody {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|err| ClientError::Transport(err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ClientError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ClientError::Transport(format!("provider returned {status}")));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ClientError::BadResponse(format!("{status}: {detail}")));
        }

        let parsed: MessagesResponseBody = response
            .json()
            .await
            .map_err(|err| ClientError::BadResponse(err.to_string()))?;

        let text = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| ClientError::BadResponse("empty content array".to_string()))?;

        Ok(CompletionResponse {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}
