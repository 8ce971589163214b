use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::document::{Chunk, Metadata};

/// Catalog row describing a named collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub id: i64,
    pub name: String,
    pub dimensions: usize,
    pub embedding_model: String,
    pub metric: String,
    pub created_at: DateTime<Utc>,
}

/// Collection summary returned by `Db::list_collections`.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    #[serde(flatten)]
    pub info: CollectionInfo,
    pub entries: usize,
}

/// The persisted tuple behind each chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub source_id: String,
    pub text: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

impl IndexEntry {
    /// Pair a chunk with its embedding.
    #[must_use]
    pub fn from_chunk(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            chunk_id: chunk.chunk_id,
            source_id: chunk.source_id,
            text: chunk.text,
            metadata: chunk.metadata,
            embedding,
        }
    }
}

/// A search hit. `score` is cosine similarity, higher is closer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub chunk_id: String,
    pub source_id: String,
    pub text: String,
    pub metadata: Metadata,
    pub score: f64,
}
