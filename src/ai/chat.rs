//! Chat-completion client.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{api_error, api_key, http, AiError};
use crate::config::AiConfig;

/// Token budget for the summarizer.
const SUMMARY_MAX_TOKENS: u32 = 150;
/// The summarizer runs slightly warm; the interpreter runs cold.
const SUMMARY_TEMPERATURE: f32 = 0.5;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct ChatClient {
    api_base: String,
    model: String,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(config: &AiConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.chat_model.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// One completion round. Returns the first choice's content.
    pub fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, AiError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_tokens,
            temperature,
        };

        let resp = http()
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(api_key()?)
            .timeout(self.timeout)
            .json(&request)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let parsed: ChatResponse = resp.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| AiError::BadShape("completion has no choices".to_string()))
    }

    /// Summarize text down to roughly `max_length` characters.
    ///
    /// Falls back to plain truncation when the API call fails, so
    /// vectorization keeps going without the summarizer.
    pub fn summarize(&self, text: &str, max_length: usize) -> String {
        let text = text.trim();
        if text.is_empty() {
            return String::new();
        }

        let messages = [
            ChatMessage::system(format!(
                "Summarize the following text in a concise way, maximum {max_length} characters."
            )),
            ChatMessage::user(text),
        ];

        match self.complete(&messages, SUMMARY_MAX_TOKENS, SUMMARY_TEMPERATURE) {
            Ok(summary) => summary,
            Err(err) => {
                log::error!("summarize failed, truncating instead: {err}");
                if text.len() > max_length {
                    let truncated: String = text.chars().take(max_length).collect();
                    format!("{truncated}...")
                } else {
                    text.to_string()
                }
            }
        }
    }
}
