use super::{Db, deserialize_vector, models::*, serialize_vector};
use crate::document::Metadata;
use crate::error::{RagError, Result};
use rusqlite::{OptionalExtension, params};

impl Db {
    /// Upsert entries by `chunk_id` in one transaction.
    ///
    /// Every embedding is checked against `dimensions` before the
    /// transaction opens, so a mismatch never leaves a partial write.
    pub fn upsert_entries(
        &mut self,
        collection: &CollectionInfo,
        entries: &[IndexEntry],
    ) -> Result<usize> {
        for entry in entries {
            if entry.embedding.len() != collection.dimensions {
                return Err(RagError::DimensionMismatch {
                    expected: collection.dimensions,
                    actual: entry.embedding.len(),
                });
            }
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO entries (collection_id, chunk_id, source_id, content, metadata, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection_id, chunk_id) DO UPDATE SET
                    source_id = excluded.source_id,
                    content = excluded.content,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding
                "#,
            )?;
            for entry in entries {
                let metadata = serde_json::to_string(&entry.metadata)?;
                stmt.execute(params![
                    collection.id,
                    entry.chunk_id,
                    entry.source_id,
                    entry.text,
                    metadata,
                    serialize_vector(&entry.embedding),
                ])?;
            }
        }
        tx.commit()?;

        Ok(entries.len())
    }

    pub fn count_entries(&self, collection: &CollectionInfo) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE collection_id = ?",
            params![collection.id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Fetch a single entry, including its stored vector.
    pub fn get_entry(
        &self,
        collection: &CollectionInfo,
        chunk_id: &str,
    ) -> Result<Option<IndexEntry>> {
        let row = self
            .conn
            .query_row(
                "SELECT chunk_id, source_id, content, metadata, embedding FROM entries WHERE collection_id = ? AND chunk_id = ?",
                params![collection.id, chunk_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(chunk_id, source_id, text, metadata, blob)| {
            let metadata: Metadata = serde_json::from_str(&metadata)?;
            Ok(IndexEntry {
                chunk_id,
                source_id,
                text,
                metadata,
                embedding: deserialize_vector(&blob),
            })
        })
        .transpose()
    }

    /// Distinct source ids in the collection, sorted.
    pub fn list_sources(&self, collection: &CollectionInfo) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT source_id FROM entries WHERE collection_id = ? ORDER BY source_id",
        )?;
        let rows = stmt.query_map(params![collection.id], |row| row.get(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetadataValue;

    fn entry(chunk_id: &str, text: &str, embedding: Vec<f32>) -> IndexEntry {
        let mut metadata = Metadata::new();
        metadata.insert("source".into(), MetadataValue::from("cpu.csv"));
        IndexEntry {
            chunk_id: chunk_id.into(),
            source_id: "cpu.csv:0".into(),
            text: text.into(),
            metadata,
            embedding,
        }
    }

    #[test]
    fn test_upsert_replaces_by_chunk_id() {
        let mut db = Db::open_in_memory().unwrap();
        let col = db.create_collection("cpu_docs", 3, "mock").unwrap();

        db.upsert_entries(
            &col,
            &[
                entry("a", "first", vec![1.0, 0.0, 0.0]),
                entry("b", "second", vec![0.0, 1.0, 0.0]),
            ],
        )
        .unwrap();
        assert_eq!(db.count_entries(&col).unwrap(), 2);

        db.upsert_entries(&col, &[entry("a", "replaced", vec![0.0, 0.0, 1.0])])
            .unwrap();
        assert_eq!(db.count_entries(&col).unwrap(), 2);

        let a = db.get_entry(&col, "a").unwrap().unwrap();
        assert_eq!(a.text, "replaced");
        assert_eq!(a.embedding, vec![0.0, 0.0, 1.0]);
        assert_eq!(a.metadata.get("source").and_then(MetadataValue::as_str), Some("cpu.csv"));
        assert!(db.get_entry(&col, "missing").unwrap().is_none());
        assert_eq!(db.list_sources(&col).unwrap(), vec!["cpu.csv:0".to_string()]);
    }

    #[test]
    fn test_dimension_mismatch_writes_nothing() {
        let mut db = Db::open_in_memory().unwrap();
        let col = db.create_collection("cpu_docs", 3, "mock").unwrap();

        let err = db
            .upsert_entries(
                &col,
                &[
                    entry("a", "ok", vec![1.0, 0.0, 0.0]),
                    entry("b", "bad", vec![1.0, 0.0]),
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(db.count_entries(&col).unwrap(), 0);
    }

    #[test]
    fn test_entries_are_scoped_per_collection() {
        let mut db = Db::open_in_memory().unwrap();
        let cpu = db.create_collection("cpu_docs", 3, "mock").unwrap();
        let gpu = db.create_collection("gpu_docs", 3, "mock").unwrap();

        db.upsert_entries(&cpu, &[entry("a", "x", vec![1.0, 0.0, 0.0])])
            .unwrap();
        db.upsert_entries(&gpu, &[entry("a", "y", vec![1.0, 0.0, 0.0])])
            .unwrap();

        assert_eq!(db.count_entries(&cpu).unwrap(), 1);
        assert_eq!(db.get_entry(&gpu, "a").unwrap().unwrap().text, "y");

        db.drop_collection("gpu_docs").unwrap();
        assert_eq!(db.count_entries(&cpu).unwrap(), 1);
    }
}
