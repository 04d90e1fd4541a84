//! Embedding client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{api_error, api_key, http, AiError};
use crate::config::AiConfig;

/// Vector width of the embedding model. Replies with any other width
/// are rejected.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct EmbeddingClient {
    api_base: String,
    model: String,
    timeout: Duration,
}

impl EmbeddingClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Embed a single input. Validates the reply is exactly one
    /// [`EMBEDDING_DIMENSIONS`]-wide vector.
    pub fn embed(&self, input: &str) -> Result<Vec<f32>, AiError> {
        let mut vectors = self.embed_batch(&[input])?;
        vectors
            .pop()
            .ok_or_else(|| AiError::BadShape("embedding reply has no data".to_string()))
    }

    /// Embed several inputs in one call. One vector per input, in order.
    pub fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, AiError> {
        if inputs.is_empty() {
            return Ok(vec![]);
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let resp = http()
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(api_key()?)
            .timeout(self.timeout)
            .json(&request)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let parsed: EmbeddingResponse = resp.json()?;

        if parsed.data.len() != inputs.len() {
            return Err(AiError::BadShape(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        parsed
            .data
            .into_iter()
            .map(|data| {
                if data.embedding.len() != EMBEDDING_DIMENSIONS {
                    return Err(AiError::BadShape(format!(
                        "expected {EMBEDDING_DIMENSIONS}-dimension embedding, got {}",
                        data.embedding.len()
                    )));
                }
                Ok(data.embedding)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = EmbeddingRequest {
            model: "text-embedding-ada-002",
            input: &["find ai companies"],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-ada-002");
        assert_eq!(json["input"][0], "find ai companies");
    }

    #[test]
    fn test_response_parses() {
        let body = r#"{
            "object": "list",
            "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2]}],
            "model": "text-embedding-ada-002"
        }"#;

        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.len(), 1);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
    }
}
