use super::{Db, models::*};
use crate::error::Result;
use rusqlite::{OptionalExtension, Row, params};
use tracing::info;

const METRIC: &str = "cosine";

fn map_collection(row: &Row<'_>) -> rusqlite::Result<CollectionInfo> {
    Ok(CollectionInfo {
        id: row.get(0)?,
        name: row.get(1)?,
        dimensions: row.get::<_, i64>(2)? as usize,
        embedding_model: row.get(3)?,
        metric: row.get(4)?,
        created_at: row.get(5)?,
    })
}

impl Db {
    /// Look up a collection by name.
    pub fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT id, name, dimensions, embedding_model, metric, created_at FROM collections WHERE name = ?",
                params![name],
                map_collection,
            )
            .optional()?;
        Ok(info)
    }

    /// Register a new, empty collection.
    pub fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        embedding_model: &str,
    ) -> Result<CollectionInfo> {
        let info = self.conn.query_row(
            r#"
            INSERT INTO collections (name, dimensions, embedding_model, metric)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, dimensions, embedding_model, metric, created_at
            "#,
            params![name, dimensions as i64, embedding_model, METRIC],
            map_collection,
        )?;
        info!(collection = name, dimensions, embedding_model, "created collection");
        Ok(info)
    }

    /// Delete every entry of a collection and re-record its embedder.
    pub fn reset_collection(
        &mut self,
        id: i64,
        dimensions: usize,
        embedding_model: &str,
    ) -> Result<CollectionInfo> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM entries WHERE collection_id = ?", params![id])?;
        let info = tx.query_row(
            r#"
            UPDATE collections SET dimensions = ?, embedding_model = ?, created_at = CURRENT_TIMESTAMP
            WHERE id = ?
            RETURNING id, name, dimensions, embedding_model, metric, created_at
            "#,
            params![dimensions as i64, embedding_model, id],
            map_collection,
        )?;
        tx.commit()?;
        Ok(info)
    }

    /// Drop a collection and all its entries. Returns whether it existed.
    pub fn drop_collection(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM collections WHERE name = ?", params![name])?;
        Ok(rows > 0)
    }

    /// All collections with their entry counts, ordered by name.
    pub fn list_collections(&self) -> Result<Vec<CollectionStats>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.id, c.name, c.dimensions, c.embedding_model, c.metric, c.created_at,
                   (SELECT COUNT(*) FROM entries e WHERE e.collection_id = c.id)
            FROM collections c
            ORDER BY c.name
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CollectionStats {
                info: map_collection(row)?,
                entries: row.get::<_, i64>(6)? as usize,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}
