//! claw-provider: model backend adapters
//!
//! One canonical request/response shape for every inference backend, plus the
//! retry decorator and the context budget check that run in front of them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

pub mod anthropic;
pub mod budget;
pub mod openai;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use budget::{check_budget, estimate_tokens};
pub use openai::{default_base_url, OpenAiCompatProvider};
pub use retry::RetryingProvider;

/// Provider errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Bad credentials or unknown model; never retried
    #[error("authentication failed ({status}): {message}")]
    Authentication { status: u16, message: String },

    /// Network failure, rate limit, or server error
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The backend answered with something outside the turn contract
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    /// Any other client error the backend refused
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("request needs ~{estimated} tokens but the context window is {limit}")]
    ContextLimitExceeded { estimated: u32, limit: u32 },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("provider misconfigured: {0}")]
    Configuration(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else if err.is_builder() {
            ProviderError::Configuration(err.to_string())
        } else {
            // connect, timeout, body and redirect failures
            ProviderError::Transient(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Map a non-success HTTP status to the error taxonomy
pub fn classify_status(status: u16, message: impl Into<String>) -> ProviderError {
    let message = message.into();
    match status {
        401 | 403 | 404 => ProviderError::Authentication { status, message },
        408 | 409 | 429 | 529 => ProviderError::Transient(format!("status {status}: {message}")),
        500..=599 => ProviderError::Transient(format!("status {status}: {message}")),
        _ => ProviderError::Rejected { status, message },
    }
}

/// Pull a readable message out of an error body
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json["error"]["message"]
                .as_str()
                .or_else(|| json["error"].as_str())
                .or_else(|| json["message"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response body".to_string()
            } else {
                trimmed.chars().take(500).collect()
            }
        })
}

/// Transcript roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
            is_error: false,
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: output.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
            is_error,
        }
    }
}

/// Tool declaration sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object
    pub parameters: Value,
}

/// Generation limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelLimits {
    pub max_tokens: u32,
    pub temperature: f32,
    pub context_window: u32,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.3,
            context_window: 65536,
        }
    }
}

/// Everything a backend needs for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub limits: ModelLimits,
}

/// What the model decided to do
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    /// Final answer; the task is over
    Final { text: String },
    /// Non-empty ordered tool calls, with optional narration
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCall>,
    },
}

impl ModelTurn {
    /// Build a turn from decoded parts, rejecting an empty response
    pub fn from_parts(text: Option<String>, calls: Vec<ToolCall>) -> Result<Self> {
        let text = text.filter(|t| !t.trim().is_empty());
        if !calls.is_empty() {
            for (i, call) in calls.iter().enumerate() {
                if calls[..i].iter().any(|earlier| earlier.id == call.id) {
                    return Err(ProviderError::MalformedResponse(format!(
                        "duplicate tool call id {}",
                        call.id
                    )));
                }
            }
            return Ok(ModelTurn::ToolCalls { text, calls });
        }
        match text {
            Some(text) => Ok(ModelTurn::Final { text }),
            None => Err(ProviderError::MalformedResponse(
                "response carried neither text nor tool calls".to_string(),
            )),
        }
    }
}

/// Token accounting reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub turn: ModelTurn,
    pub usage: Usage,
}

/// A model backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Run one turn
    async fn send(&self, request: TurnRequest) -> Result<ModelResponse>;

    /// Backend id for logs
    fn id(&self) -> String;
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    async fn send(&self, request: TurnRequest) -> Result<ModelResponse> {
        (**self).send(request).await
    }

    fn id(&self) -> String {
        (**self).id()
    }
}

/// Connection settings for one backend
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider: String,
    pub api_key: String,
    pub api_base: Option<String>,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

impl From<&claw_config::LlmConfig> for ProviderSettings {
    fn from(llm: &claw_config::LlmConfig) -> Self {
        Self {
            provider: llm.provider.clone(),
            api_key: llm.api_key.clone(),
            api_base: llm.api_base.clone(),
            request_timeout: Duration::from_secs(llm.request_timeout_secs),
            max_retries: llm.max_retries,
        }
    }
}

/// Pick the backend for `settings` and wrap it in retries
pub fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn Provider>> {
    if settings.api_key.trim().is_empty() {
        return Err(ProviderError::Configuration(format!(
            "no API key for provider '{}'",
            settings.provider
        )));
    }

    let max_attempts = settings.max_retries.max(1);
    debug!(provider = %settings.provider, max_attempts, "building provider");

    let provider: Arc<dyn Provider> = match settings.provider.as_str() {
        "anthropic" => Arc::new(RetryingProvider::new(
            AnthropicProvider::new(settings)?,
            max_attempts,
        )),
        other => {
            if settings.api_base.is_none() && default_base_url(other).is_none() {
                warn!(
                    "unknown provider '{}', falling back to the OpenAI endpoint",
                    other
                );
            }
            Arc::new(RetryingProvider::new(
                OpenAiCompatProvider::new(settings)?,
                max_attempts,
            ))
        }
    };
    Ok(provider)
}

/// Helper for adapters: collapse whitespace-only text to `None`
pub(crate) fn non_empty(text: Option<&str>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty()).map(str::to_string)
}

/// Decode tool-call arguments delivered as a JSON string
pub(crate) fn decode_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(s) if s.trim().is_empty() => Value::Object(Default::default()),
        Value::String(s) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    }
}
