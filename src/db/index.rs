use tracing::{debug, info};

use super::{CollectionInfo, Db, IndexEntry, MetadataFilter, ScoredEntry};
use crate::error::{RagError, Result};

/// How a caller intends to use a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read only. The collection must already exist.
    Query,
    /// Create the collection if it is missing.
    Ingest,
    /// Create or empty the collection, re-recording the embedder.
    Rebuild,
}

/// Handle on one named collection.
///
/// The collection records the dimensionality and embedding model it was
/// built with; opening it with a different embedder is refused.
pub struct VectorIndex {
    db: Db,
    collection: CollectionInfo,
}

impl VectorIndex {
    pub fn open(
        mut db: Db,
        name: &str,
        mode: OpenMode,
        dimensions: usize,
        embedding_model: &str,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(RagError::InvalidConfig("collection name is empty".into()));
        }
        if dimensions == 0 {
            return Err(RagError::InvalidConfig("embedding dimensions must be > 0".into()));
        }

        let collection = match (db.get_collection(name)?, mode) {
            (None, OpenMode::Query) => return Err(RagError::CollectionNotFound(name.to_string())),
            (None, _) => db.create_collection(name, dimensions, embedding_model)?,
            (Some(existing), OpenMode::Rebuild) => {
                info!(collection = name, "rebuilding collection");
                db.reset_collection(existing.id, dimensions, embedding_model)?
            }
            (Some(existing), _) => {
                if existing.dimensions != dimensions {
                    return Err(RagError::DimensionMismatch {
                        expected: existing.dimensions,
                        actual: dimensions,
                    });
                }
                if existing.embedding_model != embedding_model {
                    return Err(RagError::EmbedderMismatch {
                        collection: name.to_string(),
                        stored: existing.embedding_model,
                        requested: embedding_model.to_string(),
                    });
                }
                existing
            }
        };

        debug!(
            collection = %collection.name,
            dimensions = collection.dimensions,
            model = %collection.embedding_model,
            ?mode,
            "opened collection"
        );
        Ok(Self { db, collection })
    }

    pub fn collection(&self) -> &CollectionInfo {
        &self.collection
    }

    pub fn dimensions(&self) -> usize {
        self.collection.dimensions
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Upsert entries atomically. Re-adding a `chunk_id` replaces it.
    pub fn add(&mut self, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let n = self.db.upsert_entries(&self.collection, entries)?;
        debug!(collection = %self.collection.name, entries = n, "added entries");
        Ok(n)
    }

    pub fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredEntry>> {
        self.db.search(&self.collection, query_vector, k, filter)
    }

    pub fn count(&self) -> Result<usize> {
        self.db.count_entries(&self.collection)
    }

    pub fn get(&self, chunk_id: &str) -> Result<Option<IndexEntry>> {
        self.db.get_entry(&self.collection, chunk_id)
    }

    /// Delete every entry, keeping the collection and its embedder.
    pub fn rebuild(&mut self) -> Result<()> {
        let dims = self.collection.dimensions;
        let model = self.collection.embedding_model.clone();
        self.collection = self.db.reset_collection(self.collection.id, dims, &model)?;
        info!(collection = %self.collection.name, "cleared collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    fn entry(chunk_id: &str, text: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            chunk_id: chunk_id.into(),
            source_id: "doc".into(),
            text: text.into(),
            metadata: Metadata::new(),
            embedding,
        }
    }

    #[test]
    fn test_query_mode_requires_existing_collection() {
        let db = Db::open_in_memory().unwrap();
        let err = VectorIndex::open(db, "nope", OpenMode::Query, 3, "mock")
            .err()
            .unwrap();
        assert!(matches!(err, RagError::CollectionNotFound(name) if name == "nope"));
    }

    #[test]
    fn test_add_is_idempotent_per_chunk_id() {
        let db = Db::open_in_memory().unwrap();
        let mut index = VectorIndex::open(db, "cpu_docs", OpenMode::Ingest, 3, "mock").unwrap();

        index
            .add(&[
                entry("a", "one", vec![1.0, 0.0, 0.0]),
                entry("b", "two", vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();
        assert_eq!(index.count().unwrap(), 2);

        index.add(&[entry("a", "uno", vec![0.0, 0.0, 1.0])]).unwrap();
        assert_eq!(index.count().unwrap(), 2);
        let a = index.get("a").unwrap().unwrap();
        assert_eq!(a.text, "uno");
        assert_eq!(a.embedding, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_search_edges() {
        let db = Db::open_in_memory().unwrap();
        let mut index = VectorIndex::open(db, "cpu_docs", OpenMode::Ingest, 2, "mock").unwrap();
        assert!(index.search(&[1.0, 0.0], 4, None).unwrap().is_empty());

        index
            .add(&[entry("a", "x", vec![1.0, 0.0]), entry("b", "y", vec![0.0, 1.0])])
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 10, None).unwrap();
        assert_eq!(hits.len(), index.count().unwrap());
        assert_eq!(hits[0].chunk_id, "a");
    }

    #[test]
    fn test_embedder_mismatch_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");

        VectorIndex::open(Db::open(&path).unwrap(), "cpu_docs", OpenMode::Ingest, 3, "mock")
            .unwrap();

        let db = Db::open(&path).unwrap();
        let err = VectorIndex::open(db, "cpu_docs", OpenMode::Query, 4, "mock")
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
        ));

        let db = Db::open(&path).unwrap();
        let err = VectorIndex::open(db, "cpu_docs", OpenMode::Ingest, 3, "other")
            .err()
            .unwrap();
        assert!(matches!(err, RagError::EmbedderMismatch { .. }));

        // Rebuild accepts the new embedder and empties the collection.
        let db = Db::open(&path).unwrap();
        let index = VectorIndex::open(db, "cpu_docs", OpenMode::Rebuild, 4, "other").unwrap();
        assert_eq!(index.dimensions(), 4);
        assert_eq!(index.collection().embedding_model, "other");
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");

        {
            let mut index =
                VectorIndex::open(Db::open(&path).unwrap(), "cpu_docs", OpenMode::Ingest, 2, "mock")
                    .unwrap();
            index.add(&[entry("a", "kept", vec![1.0, 0.0])]).unwrap();
        }

        let index =
            VectorIndex::open(Db::open(&path).unwrap(), "cpu_docs", OpenMode::Query, 2, "mock")
                .unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.get("a").unwrap().unwrap().text, "kept");
    }

    #[test]
    fn test_rebuild_clears_entries() {
        let db = Db::open_in_memory().unwrap();
        let mut index = VectorIndex::open(db, "cpu_docs", OpenMode::Ingest, 2, "mock").unwrap();
        index.add(&[entry("a", "x", vec![1.0, 0.0])]).unwrap();
        index.rebuild().unwrap();
        assert_eq!(index.count().unwrap(), 0);
        assert_eq!(index.dimensions(), 2);
    }
}
