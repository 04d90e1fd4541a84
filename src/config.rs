use crate::storage::{self, StorageManager};
use serde::{Deserialize, Serialize};

const TASK_QUEUE_MAX_THREADS: u16 = 4;
const TASK_QUEUE_MAX_RETRIES: u8 = 3;

/// Default chat model used by the command interpreter and the summarizer.
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
/// Default embedding model. Produces 1536-dimension vectors.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
/// Default base URL of the hosted AI API.
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// Default per-request timeout for AI calls in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Similarity threshold the voice pipeline passes to vector search.
const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.32;
/// Result cap the voice pipeline passes to vector search.
const DEFAULT_MATCH_COUNT: usize = 10;

/// Session token lifetime: 2 hours.
const DEFAULT_SESSION_TTL_SECS: i64 = 2 * 60 * 60;
/// Tokens within this window of expiry are eligible for refresh.
const DEFAULT_REFRESH_WINDOW_SECS: i64 = 10 * 60;

/// Configuration for the hosted AI endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiConfig {
    /// Base URL of the chat/embedding API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Chat-completion model id
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model id
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Per-request timeout in seconds. Bounds every pipeline step.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Configuration for the voice search pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Minimum cosine similarity for a vector match [0.0, 1.0]
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Maximum number of vector matches returned
    #[serde(default = "default_match_count")]
    pub match_count: usize,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            match_count: DEFAULT_MATCH_COUNT,
        }
    }
}

/// Configuration for session tokens.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Token lifetime in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: i64,

    /// Refresh window before expiry in seconds
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            refresh_window_secs: DEFAULT_REFRESH_WINDOW_SECS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "task_queue_max_threads")]
    pub task_queue_max_threads: u16,

    #[serde(default = "task_queue_max_retries")]
    pub task_queue_max_retries: u8,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            task_queue_max_threads: TASK_QUEUE_MAX_THREADS,
            task_queue_max_retries: TASK_QUEUE_MAX_RETRIES,
            ai: AiConfig::default(),
            voice: VoiceConfig::default(),
            session: SessionConfig::default(),
            base_path: String::new(),
        }
    }
}

fn task_queue_max_threads() -> u16 {
    TASK_QUEUE_MAX_THREADS
}

fn task_queue_max_retries() -> u8 {
    TASK_QUEUE_MAX_RETRIES
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_similarity_threshold() -> f32 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_match_count() -> usize {
    DEFAULT_MATCH_COUNT
}

fn default_session_ttl_secs() -> i64 {
    DEFAULT_SESSION_TTL_SECS
}

fn default_refresh_window_secs() -> i64 {
    DEFAULT_REFRESH_WINDOW_SECS
}

impl Config {
    fn validate(&mut self) {
        if self.task_queue_max_threads == 0 {
            self.task_queue_max_threads = 1
        }

        let voice = &self.voice;
        if !(0.0..=1.0).contains(&voice.similarity_threshold) {
            panic!(
                "voice.similarity_threshold must be between 0.0 and 1.0, got {}",
                voice.similarity_threshold
            );
        }
        if voice.match_count == 0 {
            panic!("voice.match_count must be greater than 0");
        }

        if self.ai.request_timeout_secs == 0 {
            panic!("ai.request_timeout_secs must be greater than 0");
        }
        if self.ai.api_base.is_empty() {
            panic!("ai.api_base must not be empty");
        }

        if self.session.ttl_secs <= 0 {
            panic!("session.ttl_secs must be greater than 0");
        }
        if self.session.refresh_window_secs < 0 {
            panic!("session.refresh_window_secs must not be negative");
        }
    }

    pub fn load_with(base_path: &str) -> anyhow::Result<Self> {
        let store = storage::BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists("config.yaml") {
            store.write(
                "config.yaml",
                serde_yml::to_string(&Self::default())
                    .expect("default config serializes")
                    .as_bytes(),
            )?;
        }

        let config_str =
            String::from_utf8(store.read("config.yaml")?).expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).expect("config serializes") {
            config.save();
        }

        Ok(config)
    }

    pub fn save(&self) {
        let store = match storage::BackendLocal::new(&self.base_path) {
            Ok(store) => store,
            Err(err) => {
                log::error!("failed to open config storage: {err}");
                return;
            }
        };

        let config_str = serde_yml::to_string(&self).expect("config serializes");
        if let Err(err) = store.write("config.yaml", config_str.as_bytes()) {
            log::error!("failed to save config: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.task_queue_max_threads, 4);
        assert_eq!(config.ai.chat_model, "gpt-3.5-turbo");
        assert_eq!(config.ai.embedding_model, "text-embedding-ada-002");
        assert!((config.voice.similarity_threshold - 0.32).abs() < f32::EPSILON);
        assert_eq!(config.voice.match_count, 10);
        assert_eq!(config.session.ttl_secs, 7200);
    }

    #[test]
    #[should_panic(expected = "voice.similarity_threshold")]
    fn test_threshold_out_of_range_panics() {
        let mut config = Config::default();
        config.voice.similarity_threshold = 1.5;
        config.validate();
    }

    #[test]
    #[should_panic(expected = "voice.match_count")]
    fn test_zero_match_count_panics() {
        let mut config = Config::default();
        config.voice.match_count = 0;
        config.validate();
    }

    #[test]
    fn test_roundtrip_yaml() {
        let config = Config::default();
        let yaml = serde_yml::to_string(&config).unwrap();
        let parsed: Config = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(parsed.voice.match_count, config.voice.match_count);
        assert_eq!(parsed.ai.api_base, config.ai.api_base);
    }
}
