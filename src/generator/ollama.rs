/// Generator backed by an Ollama server's `/api/generate` endpoint.
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Generator, GeneratorError};
use crate::embedder::ollama::classify_transport;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct OllamaGenerator {
    client: Client,
    url: String,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    /// Build a blocking client. Must not be called from inside an async task.
    pub fn new(
        endpoint: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, GeneratorError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hwrag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                GeneratorError::BackendUnavailable(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self {
            client,
            url: format!("{}/api/generate", endpoint.trim_end_matches('/')),
            model: model.to_string(),
            temperature,
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GeneratorError> {
        if prompt.trim().is_empty() {
            return Err(GeneratorError::EmptyPrompt);
        }

        debug!(model = %self.model, prompt_chars = prompt.len(), "requesting generation");

        let resp = self
            .client
            .post(&self.url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: GenerateOptions {
                    temperature: self.temperature,
                },
            })
            .send()
            .map_err(|e| {
                if classify_transport(&e) {
                    GeneratorError::BackendUnavailable(format!("{}: {e}", self.url))
                } else {
                    GeneratorError::Rejected(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(GeneratorError::BackendUnavailable(format!(
                "{} answered {status}",
                self.url
            )));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(GeneratorError::Rejected(format!("{status}: {body}")));
        }

        let parsed: GenerateResponse = resp
            .json()
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;
        Ok(parsed.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
