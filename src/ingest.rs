//! Ingestion pipeline: chunk, embed and add, one document at a time.
//!
//! A document's chunks are written in a single `add`, so a failed document
//! leaves nothing behind and earlier documents stay indexed. Errors that
//! invalidate the whole collection, and cancellation, stop the run; the
//! report then says why and still counts what was written before it.
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{self, RetryPolicy};
use crate::chunker::Chunker;
use crate::db::{IndexEntry, VectorIndex};
use crate::document::{Chunk, Document};
use crate::embedder::Embedder;
use crate::error::{RagError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    pub source_id: String,
    pub error: String,
}

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub documents_succeeded: usize,
    pub documents_failed: usize,
    /// Documents that produced no chunks.
    pub documents_skipped: usize,
    pub chunks_indexed: usize,
    pub failures: Vec<IngestFailure>,
    /// Why the run stopped before the last document, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl IngestReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

pub struct Ingestor {
    index: Arc<TokioMutex<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    policy: RetryPolicy,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(
        index: Arc<TokioMutex<VectorIndex>>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        policy: RetryPolicy,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(RagError::InvalidConfig("embedding batch_size must be > 0".into()));
        }
        Ok(Self {
            index,
            embedder,
            chunker,
            policy,
            batch_size,
        })
    }

    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        self.ingest_with_cancel(documents, &CancellationToken::new())
            .await
    }

    /// Ingest `documents` in order.
    ///
    /// Only an embedder that cannot fit the collection at all is an `Err`.
    /// Later collection-fatal errors and cancellation end the run with
    /// [`IngestReport::aborted`] set.
    pub async fn ingest_with_cancel(
        &self,
        documents: &[Document],
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let (collection, expected) = {
            let index = self.index.lock().await;
            (index.collection().name.clone(), index.dimensions())
        };
        if self.embedder.dimensions() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: self.embedder.dimensions(),
            });
        }

        info!(%collection, documents = documents.len(), "ingesting");
        let mut report = IngestReport::default();

        for document in documents {
            let chunks = self.chunker.split(document);
            if chunks.is_empty() {
                report.documents_skipped += 1;
                continue;
            }

            match self.ingest_chunks(chunks, cancel).await {
                Ok(n) => {
                    report.documents_succeeded += 1;
                    report.chunks_indexed += n;
                }
                Err(e) if e.is_fatal_for_index() || matches!(e, RagError::Cancelled) => {
                    warn!(source_id = %document.source_id, error = %e, "aborting ingestion");
                    report.aborted = Some(format!("{}: {e}", document.source_id));
                    break;
                }
                Err(e) => {
                    warn!(source_id = %document.source_id, error = %e, "document failed");
                    report.documents_failed += 1;
                    report.failures.push(IngestFailure {
                        source_id: document.source_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            %collection,
            succeeded = report.documents_succeeded,
            failed = report.documents_failed,
            skipped = report.documents_skipped,
            chunks = report.chunks_indexed,
            complete = report.is_complete(),
            "ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_chunks(&self, chunks: Vec<Chunk>, cancel: &CancellationToken) -> Result<usize> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedder = Arc::clone(&self.embedder);
            let embedded = backend::call("embedding", &self.policy, cancel, move || {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                Ok(embedder.embed_batch(&refs)?)
            })
            .await?;

            if embedded.len() != batch.len() {
                return Err(RagError::Backend(format!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }

        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexEntry::from_chunk(chunk, embedding))
            .collect();

        self.index.lock().await.add(&entries)
    }
}
