//! Generation backend: turns a composed prompt into answer text.
pub mod mock;
pub mod ollama;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{GenerationConfig, GenerationProvider};

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("cannot generate from an empty prompt")]
    EmptyPrompt,

    /// Service unreachable, timed out or answered 5xx. Retryable.
    #[error("generation backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("generation rejected: {0}")]
    Rejected(String),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

/// Synchronous request/response text generation.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GeneratorError>;

    fn model_name(&self) -> &str;
}

/// Build the generator selected by the configuration.
pub fn from_config(
    config: &GenerationConfig,
    timeout: Duration,
) -> Result<Arc<dyn Generator>, GeneratorError> {
    Ok(match config.provider {
        GenerationProvider::Mock => Arc::new(mock::MockGenerator),
        GenerationProvider::Ollama => Arc::new(ollama::OllamaGenerator::new(
            &config.endpoint,
            &config.model,
            config.temperature,
            timeout,
        )?),
    })
}
