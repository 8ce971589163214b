use super::{Db, MetadataFilter, models::*, serialize_vector};
use crate::document::Metadata;
use crate::error::{RagError, Result};
use rusqlite::types::Value;

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ScoredEntry, String)> {
    let distance: f64 = row.get(4)?;
    Ok((
        ScoredEntry {
            chunk_id: row.get(0)?,
            source_id: row.get(1)?,
            text: row.get(2)?,
            metadata: Metadata::new(),
            // vec_distance_cosine is 1 - cosine similarity
            score: 1.0 - distance,
        },
        row.get(3)?,
    ))
}

impl Db {
    /// Rank a collection's entries by cosine similarity to `query_vector`.
    ///
    /// Returns at most `top_k` hits, best first; exact score ties are broken
    /// by `chunk_id` ascending. An optional metadata filter narrows the
    /// candidates before ranking.
    pub fn search(
        &self,
        collection: &CollectionInfo,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredEntry>> {
        if query_vector.len() != collection.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: collection.dimensions,
                actual: query_vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut query = String::from(
            r#"
            SELECT
                e.chunk_id,
                e.source_id,
                e.content,
                e.metadata,
                vec_distance_cosine(e.embedding, ?) AS distance
            FROM entries e
            WHERE e.collection_id = ?
            "#,
        );
        let mut params: Vec<Value> = vec![
            Value::Blob(serialize_vector(query_vector)),
            Value::Integer(collection.id),
        ];

        if let Some(f) = filter {
            query.push_str(" AND ");
            f.to_sql(&mut query, &mut params)?;
        }

        query.push_str(" ORDER BY distance ASC, e.chunk_id ASC LIMIT ?");
        params.push(Value::Integer(top_k as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), map_search_row)?;

        let mut results = Vec::new();
        for row in rows {
            let (mut hit, metadata) = row?;
            hit.metadata = serde_json::from_str(&metadata)?;
            results.push(hit);
        }

        Ok(results)
    }
}
