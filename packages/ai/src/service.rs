// ABOUTME: Generation client for making chat-completion calls to the model endpoint
// ABOUTME: Handles API requests, response parsing, and usage accounting

use std::env;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use codex_config::{CODEX_GENERATION_API_KEY, CODEX_GENERATION_API_URL, CODEX_GENERATION_MODEL};

const DEFAULT_API_URL: &str = "https://api.anthropic.com";
const MESSAGES_PATH: &str = "/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-haiku-4-5";
const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TOP_P: f32 = 0.9;

/// Errors from the generation endpoint, kept distinguishable so the
/// orchestrator can choose retry vs fail-fast per variant.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("No generation API key configured")]
    MissingApiKey,

    #[error("Generation endpoint rate limited: {0}")]
    RateLimited(String),

    #[error("Generation API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Generation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Failed to parse generation response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One turn of the conversation handed to the generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Model parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: env::var(CODEX_GENERATION_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
        }
    }
}

/// Generated text plus token usage metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The external-call boundary for text generation. The orchestrator depends
/// on this trait, never on the concrete HTTP client.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<GenerationResult, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// HTTP client for the generation endpoint.
///
/// No retry logic lives here; retries are the orchestrator's responsibility
/// so the retry budget is shared across the whole pipeline.
pub struct GenerationClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GenerationClient {
    fn create_client() -> Client {
        Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client")
    }

    /// Create a client from the environment. The API key comes from
    /// `CODEX_GENERATION_API_KEY`; a missing key surfaces as
    /// [`GenerationError::MissingApiKey`] at call time, not here.
    pub fn new() -> Self {
        let api_key = env::var(CODEX_GENERATION_API_KEY).ok();
        if api_key.is_none() {
            info!("{} not set - generation calls will fail fast", CODEX_GENERATION_API_KEY);
        }

        let base_url =
            env::var(CODEX_GENERATION_API_URL).unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        Self {
            client: Self::create_client(),
            base_url,
            api_key,
        }
    }

    pub fn with_api_key(api_key: String) -> Self {
        Self {
            client: Self::create_client(),
            base_url: env::var(CODEX_GENERATION_API_URL)
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            api_key: Some(api_key),
        }
    }

    /// Point the client at a different endpoint. Used by tests against a
    /// local mock server.
    pub fn with_base_url(api_key: Option<String>, base_url: String) -> Self {
        Self {
            client: Self::create_client(),
            base_url,
            api_key,
        }
    }

    fn build_request(messages: &[ChatMessage], options: &GenerationOptions) -> ApiRequest {
        // The endpoint takes system instructions as a dedicated field, so
        // system-role messages are lifted out of the message list.
        let mut system_parts = Vec::new();
        let mut wire_messages = Vec::new();

        for message in messages {
            match message.role {
                MessageRole::System => system_parts.push(message.content.clone()),
                MessageRole::User => wire_messages.push(WireMessage {
                    role: "user".to_string(),
                    content: message.content.clone(),
                }),
                MessageRole::Assistant => wire_messages.push(WireMessage {
                    role: "assistant".to_string(),
                    content: message.content.clone(),
                }),
            }
        }

        ApiRequest {
            model: options.model.clone(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            messages: wire_messages,
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
        }
    }
}

impl Default for GenerationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<GenerationResult, GenerationError> {
        let api_key = self.api_key.as_ref().ok_or(GenerationError::MissingApiKey)?;

        let request = Self::build_request(messages, options);

        info!(
            "Generation request: model={}, max_tokens={}, messages={}",
            request.model,
            request.max_tokens,
            request.messages.len()
        );

        let response = self
            .client
            .post(format!("{}{}", self.base_url, MESSAGES_PATH))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let message = response.text().await.unwrap_or_default();
            error!("Generation endpoint rate limited: {}", message);
            return Err(GenerationError::RateLimited(message));
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Generation API error: {} - {}", status, message);
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        let content = api_response
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(GenerationError::Parse(
                "Response contained no text content".to_string(),
            ));
        }

        let usage = api_response.usage;
        Ok(GenerationResult {
            content,
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
        })
    }
}
