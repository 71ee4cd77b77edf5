//! HTTP chat-completion client.

use super::{GenerateError, TagGenerator};
use crate::config::GenerationConfig;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Production generator: one POST per attempt to a chat-completion-style
/// endpoint.
///
/// The underlying `reqwest::Client` (and its connection pool) is built
/// once per run and shared by reference across all calls; its timeout
/// bounds every attempt, and expiry surfaces as a retryable transport
/// failure.
pub struct HttpGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl HttpGenerator {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TagGenerator for HttpGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": super::prompt::SYSTEM_INSTRUCTION},
                {"role": "user", "content": prompt}
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_output_tokens,
        });

        let mut request = self
            .client
            .post(self.url())
            .bearer_auth(&self.config.api_key)
            .json(&payload);
        for (name, value) in &self.config.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let json: Value = response.json().await?;
        debug!(model = %self.config.model, "generation call completed");
        Ok(extract_message_content(&json).unwrap_or_default())
    }
}

/// Pull the first message's content out of a chat-completion response.
/// Handles both plain-string and array-of-parts content shapes; a response
/// without usable content reads as empty (zero proposed tags).
fn extract_message_content(json: &Value) -> Option<String> {
    let choices = json.get("choices").and_then(Value::as_array)?;
    let content = choices.first()?.get("message")?.get("content")?;
    match content {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => {
            let chunks: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            if chunks.is_empty() {
                None
            } else {
                Some(chunks.join("\n"))
            }
        }
        _ => None,
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.trim().to_string();
    }
    body.chars()
        .take(MAX_ERROR_BODY_CHARS)
        .collect::<String>()
        .trim()
        .to_string()
}
