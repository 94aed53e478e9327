//! Model backend clients
//!
//! The pipeline treats the large model as an opaque text-completion
//! service. Two adapters: Ollama chat and OpenAI-compatible chat, both with
//! retry and exponential backoff for transient failures.

pub mod backend;
pub mod prompt;

pub use backend::{
    create_backend, GenerationResult, LlmBackend, LlmClientConfig, OllamaBackend, OpenAiBackend,
};
pub use prompt::{Message, Role};

use thiserror::Error;

/// LLM client errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
