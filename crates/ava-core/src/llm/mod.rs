//! Language-model clients used to phrase Ava's replies.

pub mod offline;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

pub use offline::OfflineResponder;
pub use openai::OpenAiClient;

/// Opening of the system prompt used when asking for a conversation summary.
pub const SUMMARY_PROMPT: &str = "Summarize the following conversation";

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limit exceeded (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed response: {0}")]
    Serialization(String),
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model label reported in status output.
    fn model(&self) -> &str;

    async fn generate_response(&self, messages: &[Message]) -> LlmResult<String>;
}

/// OpenAI-compatible client when an API key is configured, otherwise the
/// offline responder.
pub fn client_from_config(config: &LlmConfig) -> LlmResult<Arc<dyn LlmClient>> {
    if config.api_key.as_deref().is_some_and(|k| !k.trim().is_empty()) {
        Ok(Arc::new(OpenAiClient::new(config)?))
    } else {
        tracing::info!("no api key configured, using offline responder");
        Ok(Arc::new(OfflineResponder::new()))
    }
}
