//! Query path: embed the question, then rank the collection against it.
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{self, RetryPolicy};
use crate::db::{MetadataFilter, ScoredEntry, VectorIndex};
use crate::embedder::Embedder;
use crate::error::{RagError, Result};

/// Ranked hits for one query, best first. Never longer than the requested `k`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredEntry>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn chunk_ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.chunk_id.as_str()).collect()
    }
}

#[derive(Clone)]
pub struct Retriever {
    index: Arc<TokioMutex<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    policy: RetryPolicy,
}

impl Retriever {
    pub fn new(
        index: Arc<TokioMutex<VectorIndex>>,
        embedder: Arc<dyn Embedder>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            index,
            embedder,
            policy,
        }
    }

    pub fn index(&self) -> &Arc<TokioMutex<VectorIndex>> {
        &self.index
    }

    /// Retrieve the `k` entries closest to `query`, optionally restricted by
    /// a metadata filter.
    ///
    /// An embedder or storage failure is reported as `RetrieverUnavailable`
    /// rather than an empty result.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidConfig("k must be at least 1".into()));
        }
        if query.trim().is_empty() {
            return Err(RagError::EmptyInput("query text is empty".into()));
        }

        let expected = self.index.lock().await.dimensions();
        if self.embedder.dimensions() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: self.embedder.dimensions(),
            });
        }

        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = backend::call("query embedding", &self.policy, cancel, move || {
            Ok(embedder.embed(&text)?)
        })
        .await
        .map_err(unavailable)?;

        if cancel.is_cancelled() {
            return Err(RagError::Cancelled);
        }

        let hits = self
            .index
            .lock()
            .await
            .search(&vector, k, filter)
            .map_err(unavailable)?;

        debug!(k, hits = hits.len(), filtered = filter.is_some(), "retrieved");
        Ok(RetrievalResult { hits })
    }
}

/// Wrap backend and storage failures; caller errors pass through.
fn unavailable(err: RagError) -> RagError {
    match err {
        RagError::BackendUnavailable(_) | RagError::Storage(_) | RagError::Io(_) => {
            RagError::RetrieverUnavailable(Box::new(err))
        }
        other => other,
    }
}
