//! Thin clients for the hosted AI endpoints.
//!
//! Both clients speak the hosted API's JSON wire format over blocking
//! reqwest with a per-request timeout, so no pipeline step can hang
//! indefinitely. Responses are parsed into typed structs at the
//! boundary; unexpected shapes are errors, not blind casts.

pub mod chat;
pub mod embeddings;

use once_cell::sync::Lazy;
use std::time::Duration;

pub use chat::ChatClient;
pub use embeddings::{EmbeddingClient, EMBEDDING_DIMENSIONS};

/// Environment variable holding the AI API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("{API_KEY_ENV} is not set")]
    MissingApiKey,

    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    BadShape(String),
}

static HTTP: Lazy<reqwest::blocking::Client> = Lazy::new(|| {
    reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("http client builds")
});

pub(crate) fn http() -> &'static reqwest::blocking::Client {
    &HTTP
}

pub(crate) fn api_key() -> Result<String, AiError> {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => Err(AiError::MissingApiKey),
    }
}

/// Pull a human-readable message out of an API error body, if present.
pub(crate) fn api_error(status: u16, body: &str) -> AiError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.chars().take(200).collect());

    AiError::Api { status, message }
}
