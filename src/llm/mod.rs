//! Tag generation — one chat-completion round trip per attempt.
//!
//! The `TagGenerator` trait abstracts over transport so the pipeline and
//! its tests don't depend on how the service is reached; `HttpGenerator`
//! is the production implementation.

mod http;
pub mod prompt;

pub use http::HttpGenerator;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures of a single generation attempt.
///
/// Every variant is retryable; the retry loop absorbs them and they never
/// propagate past it.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Connection errors and timeouts.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("generation endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// One request/response round trip to a text-generation service.
#[async_trait]
pub trait TagGenerator: Send + Sync {
    /// Send a single prompt and return the response's message content.
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError>;
}

/// Outcome of generation for one document; only the last attempt is kept.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub document_id: String,
    /// Tags recovered from the response; empty on failure or when the
    /// response carried no parsable array.
    pub proposed_tags: Vec<String>,
    pub raw_response: String,
    /// The last attempt's failure, when every attempt failed.
    pub error: Option<String>,
    pub attempts: usize,
}

/// Scan text for the first parsable JSON array literal and keep its string
/// elements. Unparsable or non-array content yields an empty list — a
/// parse failure is zero proposed tags, not an error.
pub fn extract_tag_array(text: &str) -> Vec<String> {
    for (pos, _) in text.match_indices('[') {
        let mut stream = serde_json::Deserializer::from_str(&text[pos..]).into_iter::<Value>();
        if let Some(Ok(Value::Array(items))) = stream.next() {
            return items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
    Vec::new()
}
