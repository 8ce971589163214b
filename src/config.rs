/// Configuration module for hwrag.
///
/// Handles loading, validating, and providing default configuration values.
/// Every component receives its own section at construction time.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RagError, Result};

/// Extensions the loaders know how to turn into documents.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "pdf", "txt", "md"];

// ── Default value functions ──────────────────────────────────────────

fn default_document_patterns() -> Vec<String> {
    vec!["./data/documents".to_string()]
}

fn default_db_path() -> String {
    "./data/vectors.db".to_string()
}

fn default_collection() -> String {
    "cpu_docs".to_string()
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_top_k() -> usize {
    3
}

fn default_max_context_chars() -> usize {
    4000
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "all-minilm".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_batch_size() -> usize {
    32
}

fn default_model_dir() -> String {
    "models/all-MiniLM-L6-v2".to_string()
}

fn default_generation_model() -> String {
    "alibayram/smollm3:latest".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    500
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_document_patterns")]
    pub document_patterns: Vec<String>,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Name shared by the ingestion and query phases.
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub answer: AnswerConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks of the same document.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct AnswerConfig {
    /// Character budget for the concatenated context sections.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Ollama,
    Onnx,
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Only used by the `onnx` provider.
    #[serde(default = "default_model_dir")]
    pub model_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    #[default]
    Ollama,
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: GenerationProvider,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

/// Timeout and retry policy shared by every external backend call.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct BackendConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            document_patterns: default_document_patterns(),
            db_path: default_db_path(),
            collection: default_collection(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            answer: AnswerConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            endpoint: default_ollama_endpoint(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            model_dir: default_model_dir(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::default(),
            model: default_generation_model(),
            endpoint: default_ollama_endpoint(),
            temperature: default_temperature(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl BackendConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, writes a template next to the binary's cwd.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)?;
        let mut cfg: Config = serde_json::from_str(&data)
            .map_err(|e| RagError::InvalidConfig(format!("invalid JSON in {path}: {e}")))?;

        info!("Loaded configuration from {path}");

        if cfg.document_patterns.is_empty() {
            cfg.document_patterns = default_document_patterns();
        }

        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Validate configuration values. Runs before any ingestion or query work.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        ensure(!self.collection.trim().is_empty(), "collection name must not be empty")?;
        ensure(self.retrieval.top_k > 0, "retrieval.top_k must be at least 1")?;
        ensure(
            self.answer.max_context_chars > 0,
            "answer.max_context_chars must be positive",
        )?;
        ensure(
            self.answer.max_context_chars >= self.chunking.chunk_size,
            "answer.max_context_chars must hold at least one chunk (chunking.chunk_size)",
        )?;
        ensure(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive",
        )?;
        ensure(
            self.embedding.batch_size > 0,
            "embedding.batch_size must be positive",
        )?;
        ensure(
            self.backend.timeout_secs > 0,
            "backend.timeout_secs must be positive",
        )?;
        ensure(
            self.backend.max_retries <= 1,
            "backend.max_retries must be 0 or 1",
        )?;
        ensure(
            !self.document_patterns.is_empty(),
            "at least one document pattern must be specified",
        )?;
        Ok(())
    }

    /// Expand all document patterns into the files the loaders support.
    pub fn get_document_files(&self) -> Vec<PathBuf> {
        let mut files = HashSet::new();

        for pattern in &self.document_patterns {
            match expand_pattern(pattern) {
                Ok(matches) => files.extend(matches),
                Err(e) => warn!("Failed to expand pattern {pattern}: {e}"),
            }
        }

        let mut files: Vec<PathBuf> = files.into_iter().collect();
        files.sort();
        files
    }
}

fn ensure(condition: bool, msg: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(RagError::InvalidConfig(msg.to_string()))
    }
}

// ── Pattern helpers ──────────────────────────────────────────────────

/// Whether the loaders can turn `path` into documents.
#[must_use]
pub fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand a single pattern: plain paths are taken as files or directories,
/// anything with a wildcard goes through `glob`.
fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    if !pattern.contains(['*', '?', '[']) {
        let path = Path::new(pattern);
        if path.is_file() {
            return Ok(if is_supported_file(path) {
                vec![path.to_path_buf()]
            } else {
                Vec::new()
            });
        }
        return Ok(walk_supported(path));
    }

    let matches = glob::glob(pattern)
        .map_err(|e| RagError::InvalidConfig(format!("invalid glob pattern {pattern}: {e}")))?;
    Ok(matches
        .flatten()
        .filter(|p| p.is_file() && is_supported_file(p))
        .collect())
}

pub(crate) fn walk_supported(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    ignore::WalkBuilder::new(dir)
        .hidden(false)
        .build()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_supported_file(p))
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────
