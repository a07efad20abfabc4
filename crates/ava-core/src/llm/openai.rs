//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde_json::{json, Value};

use super::{LlmClient, LlmError, LlmResult, Message};
use crate::config::LlmConfig;

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidRequest("no api key configured".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn headers(&self) -> LlmResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn payload(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }

    fn map_error(status: u16, retry_after: Option<u64>, body: &str) -> LlmError {
        match status {
            401 | 403 => LlmError::Authentication(body.to_string()),
            429 => LlmError::RateLimited { retry_after },
            _ => LlmError::Api {
                status,
                message: body.to_string(),
            },
        }
    }

    fn parse_content(body: &Value) -> LlmResult<String> {
        let content = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if content.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate_response(&self, messages: &[Message]) -> LlmResult<String> {
        if messages.is_empty() {
            return Err(LlmError::InvalidRequest("no messages".into()));
        }
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(url)
            .headers(self.headers()?)
            .json(&self.payload(messages))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                model = %self.model,
                "language model request failed"
            );
            return Err(Self::map_error(status.as_u16(), retry_after, &text));
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| LlmError::Serialization(e.to_string()))?;
        Self::parse_content(&body)
    }
}
