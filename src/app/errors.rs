use crate::ai::AiError;
use crate::vector::VectorSearchError;
use crate::voice::VoiceError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("record not found")]
    NotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("voice search failed: {0}")]
    Voice(#[from] VoiceError),

    #[error("ai request failed: {0}")]
    Ai(#[from] AiError),

    #[error("vector search failed: {0}")]
    Vector(#[from] VectorSearchError),

    #[error("reqwest error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("Base64: {0:?}")]
    Base64(#[from] base64::DecodeError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}
