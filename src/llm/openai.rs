use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::Config;
use crate::llm::media::detect_mime_type;
use crate::llm::{ChatError, ChatModel, ChatRequest};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

const ERROR_BODY_LOG_LIMIT: usize = 2000;

pub(crate) fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

pub(crate) fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("detail").and_then(|v| v.as_str()))
            .or_else(|| value.get("message").and_then(|v| v.as_str()))
            .map(|v| v.to_string());
        return (message, truncate_for_log(&value.to_string(), ERROR_BODY_LOG_LIMIT));
    }

    (None, truncate_for_log(trimmed, ERROR_BODY_LOG_LIMIT))
}

fn build_message_content(text: &str, images: &[Vec<u8>]) -> Value {
    if images.is_empty() {
        return Value::String(text.to_string());
    }

    let mut parts = vec![json!({ "type": "text", "text": text })];
    for image in images {
        let mime_type = detect_mime_type(image).unwrap_or_else(|| "image/jpeg".to_string());
        let encoded = general_purpose::STANDARD.encode(image);
        parts.push(json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{};base64,{}", mime_type, encoded) }
        }));
    }
    Value::Array(parts)
}

fn extract_message_text(response: &Value) -> Option<String> {
    let content = response
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))?;

    // Some compatible servers return content as a list of typed parts.
    if let Some(text) = content.as_str() {
        return Some(text.trim().to_string());
    }
    let parts = content.as_array()?;
    let joined = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|v| v.as_str()))
        .collect::<Vec<_>>()
        .join("\n");
    Some(joined.trim().to_string())
}

/// Chat-completions client for OpenAI and compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        OpenAiClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.openai_base_url,
            &config.openai_api_key,
            config.llm_timeout(),
        )
    }

    fn build_payload(request: &ChatRequest) -> Value {
        json!({
            "model": request.model,
            "messages": [
                { "role": "user", "content": build_message_content(&request.text, &request.images) }
            ],
            "max_tokens": request.max_tokens,
        })
    }

    async fn call_api(&self, payload: &Value) -> Result<Value, ChatError> {
        debug!(
            "Chat completion request: model={}, images={}",
            payload.get("model").and_then(|v| v.as_str()).unwrap_or("unknown"),
            payload
                .pointer("/messages/0/content")
                .and_then(|v| v.as_array())
                .map(|parts| parts.len().saturating_sub(1))
                .unwrap_or(0)
        );

        let response = get_http_client()
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ChatError::Timeout(self.timeout.as_secs())
                } else {
                    ChatError::Transport(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!(
                "Chat completion API error: status={}, body={}",
                status, body_summary
            );
            return Err(ChatError::Status {
                status: status.as_u16(),
                detail: message.unwrap_or(body_summary),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| ChatError::Decode(err.to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ChatError> {
        let payload = Self::build_payload(request);
        let metadata = json!({ "images": request.images.len(), "max_tokens": request.max_tokens });
        log_llm_timing(
            "openai",
            &request.model,
            &request.operation,
            Some(metadata),
            || async {
                let response = self.call_api(&payload).await?;
                let text = extract_message_text(&response).unwrap_or_default();
                if text.is_empty() {
                    warn!(
                        "Chat completion returned no content: {}",
                        truncate_for_log(&response.to_string(), ERROR_BODY_LOG_LIMIT)
                    );
                    return Err(ChatError::EmptyResponse);
                }
                Ok(text)
            },
        )
        .await
    }
}
