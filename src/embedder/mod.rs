//! Embedder trait and shared types for text embedding.
//!
//! Every implementation maps text to a vector of fixed dimensionality and is
//! blocking; async callers go through [`crate::backend`].
pub mod download;
pub mod mock;
pub mod ollama;
pub mod onnx;

use std::sync::Arc;

use thiserror::Error;

use crate::config::{EmbeddingConfig, EmbeddingProvider};

/// Errors that can occur during embedding operations.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("cannot embed zero-length text")]
    EmptyInput,

    /// Service unreachable, timed out or answered 5xx. Retryable.
    #[error("embedding backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("tokenizer error: {0}")]
    TokenizerError(String),
}

/// Trait for text embedding implementations.
///
/// All implementations must be `Send + Sync` to allow concurrent use
/// behind `Arc`. Identical text must map to an identical vector for a
/// fixed model.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Embed multiple text strings into vectors, preserving order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Model identifier recorded on the collection at ingestion time.
    fn model_name(&self) -> &str;
}

/// Reject text that would otherwise be vectorized as noise.
pub(crate) fn ensure_not_empty(text: &str) -> Result<(), EmbedderError> {
    if text.trim().is_empty() {
        Err(EmbedderError::EmptyInput)
    } else {
        Ok(())
    }
}

pub(crate) fn ensure_dimensions(vec: &[f32], expected: usize) -> Result<(), EmbedderError> {
    if vec.len() == expected {
        Ok(())
    } else {
        Err(EmbedderError::DimensionMismatch {
            expected,
            actual: vec.len(),
        })
    }
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vec: &mut [f32]) {
    let norm_sq: f32 = vec.iter().map(|v| v * v).sum();
    if norm_sq > 0.0 {
        let inv = 1.0 / norm_sq.sqrt();
        for v in vec.iter_mut() {
            *v *= inv;
        }
    }
}

/// Build the embedder selected by the configuration.
pub fn from_config(
    config: &EmbeddingConfig,
    timeout: std::time::Duration,
) -> Result<Arc<dyn Embedder>, EmbedderError> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::Mock => Arc::new(mock::MockEmbedder::new(config.dimensions)),
        EmbeddingProvider::Ollama => Arc::new(ollama::OllamaEmbedder::new(
            &config.endpoint,
            &config.model,
            config.dimensions,
            timeout,
        )?),
        EmbeddingProvider::Onnx => {
            let embedder = onnx::OnnxEmbedder::new(std::path::Path::new(&config.model_dir))?;
            if embedder.dimensions() != config.dimensions {
                return Err(EmbedderError::DimensionMismatch {
                    expected: config.dimensions,
                    actual: embedder.dimensions(),
                });
            }
            Arc::new(embedder)
        }
    };
    Ok(embedder)
}
