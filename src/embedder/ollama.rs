/// Embedder backed by an Ollama server's `/api/embed` endpoint.
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Embedder, EmbedderError, ensure_dimensions, ensure_not_empty};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct OllamaEmbedder {
    client: Client,
    url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// Build a blocking client. Must not be called from inside an async task.
    pub fn new(
        endpoint: &str,
        model: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbedderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hwrag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EmbedderError::ModelLoadFailed(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/api/embed", endpoint.trim_end_matches('/')),
            model: model.to_string(),
            dimensions,
        })
    }
}

/// Classify a transport failure. Anything that did not produce a usable
/// response from a reachable server is worth retrying.
pub(crate) fn classify_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| EmbedderError::InferenceFailed("empty embeddings response".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            ensure_not_empty(text)?;
        }

        debug!(model = %self.model, batch = texts.len(), "requesting embeddings");

        let resp = self
            .client
            .post(&self.url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .map_err(|e| {
                if classify_transport(&e) {
                    EmbedderError::BackendUnavailable(format!("{}: {e}", self.url))
                } else {
                    EmbedderError::InferenceFailed(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(EmbedderError::BackendUnavailable(format!(
                "{} answered {status}",
                self.url
            )));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(EmbedderError::InferenceFailed(format!(
                "{} answered {status}: {body}",
                self.url
            )));
        }

        let parsed: EmbedResponse = resp
            .json()
            .map_err(|e| EmbedderError::InferenceFailed(format!("invalid embed response: {e}")))?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EmbedderError::InferenceFailed(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        for vec in &parsed.embeddings {
            ensure_dimensions(vec, self.dimensions)?;
        }

        Ok(parsed.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
