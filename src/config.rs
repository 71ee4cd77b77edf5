//! Run configuration — already-resolved values handed to the pipeline.
//!
//! The CLI assembles these from flags and environment variables before any
//! document is processed; a missing credential aborts here, never mid-run.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Environment variables consulted for the generation credential, in order.
pub const API_KEY_VARS: [&str; 2] = ["TAGMILL_API_KEY", "OPENAI_API_KEY"];

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 256;
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;
pub const DEFAULT_MAX_RETRIES: usize = 2;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 45;

/// Errors that abort a run before any document is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing generation credential: set {} or {}", API_KEY_VARS[0], API_KEY_VARS[1])]
    MissingCredential,

    #[error("invalid header '{0}': expected 'Name: Value'")]
    InvalidHeader(String),
}

/// Connection settings for the chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Base URL; the adapter appends `/chat/completions`.
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Static headers sent with every request.
    pub extra_headers: Vec<(String, String)>,
    /// Per-attempt timeout; expiry is a retryable transport failure.
    pub request_timeout: Duration,
}

impl GenerationConfig {
    /// Connection settings with library defaults for everything but the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            extra_headers: Vec::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Everything the pipeline needs for one pass over the corpus.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub generation: GenerationConfig,
    /// Language the proposed tags should be written in.
    pub language: String,
    /// Ceiling on simultaneous in-flight generation calls.
    pub max_concurrency: usize,
    /// Further attempts after a failed generation call.
    pub max_retries: usize,
    /// Sort each document's tags instead of keeping merge order.
    pub sort_tags: bool,
    /// Report without writing the index or any document.
    pub dry_run: bool,
}

impl RunConfig {
    pub fn new(generation: GenerationConfig) -> Self {
        Self {
            generation,
            language: DEFAULT_LANGUAGE.to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            sort_tags: false,
            dry_run: false,
        }
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Resolve the generation credential from the environment.
///
/// This is the fatal pre-flight check: callers must run it before
/// scheduling any document.
pub fn resolve_api_key() -> Result<String, ConfigError> {
    API_KEY_VARS
        .iter()
        .find_map(|var| env_non_empty(var))
        .ok_or(ConfigError::MissingCredential)
}

/// Parse a `Name: Value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String), ConfigError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| ConfigError::InvalidHeader(raw.to_string()))?;
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() || value.is_empty() {
        return Err(ConfigError::InvalidHeader(raw.to_string()));
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_header_splits_on_first_colon() {
        let (name, value) = parse_header("X-Proxy-Target: http://internal:8080").unwrap();
        assert_eq!(name, "X-Proxy-Target");
        assert_eq!(value, "http://internal:8080");
    }

    #[test]
    fn parse_header_rejects_missing_parts() {
        assert!(parse_header("NoColonHere").is_err());
        assert!(parse_header(": value-only").is_err());
        assert!(parse_header("name-only:").is_err());
    }

    #[test]
    fn generation_config_defaults() {
        let config = GenerationConfig::new("k");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.request_timeout.as_secs(), DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(config.extra_headers.is_empty());
    }

    #[test]
    fn run_config_defaults() {
        let config = RunConfig::new(GenerationConfig::new("k"));
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert!(!config.sort_tags);
        assert!(!config.dry_run);
    }
}
