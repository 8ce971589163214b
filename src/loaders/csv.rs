//! Benchmark tables: one document per row.
use std::path::Path;

use crate::document::{Document, Metadata, MetadataValue};
use crate::error::{RagError, Result};

use super::path_key;

/// Columns whose integral values are rendered without a decimal point.
const COUNT_COLUMNS: &[&str] = &["age", "cores", "test_date"];

pub fn load(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)?;
    parse(&content, &path_key(path))
}

/// Parse CSV text; `source` names the file in ids and metadata.
pub fn parse(content: &str, source: &str) -> Result<Vec<Document>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| RagError::Loader(format!("{source}: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut documents = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| RagError::Loader(format!("{source} row {row}: {e}")))?;

        let mut sentences = Vec::with_capacity(headers.len());
        let mut metadata = Metadata::new();
        for (i, header) in headers.iter().enumerate() {
            let cell = record.get(i).unwrap_or("").trim();
            sentences.push(format!("The {header} is {}.", format_cell(cell, header)));
            if !cell.is_empty() {
                metadata.insert(header.clone(), MetadataValue::infer(cell));
            }
        }
        metadata.insert("source".into(), MetadataValue::from(source));
        metadata.insert("row".into(), MetadataValue::from(row));

        documents.push(Document {
            source_id: format!("{source}:row{row}"),
            content: sentences.join(" "),
            metadata,
        });
    }
    Ok(documents)
}

/// Render one cell for the row sentence.
fn format_cell(cell: &str, column: &str) -> String {
    if cell.is_empty() {
        return "Null".to_string();
    }
    match cell.parse::<f64>() {
        Ok(n) if n.is_finite() => {
            if COUNT_COLUMNS.contains(&column) && n.fract() == 0.0 {
                format!("{}", n as i64)
            } else {
                format!("{n:?}")
            }
        }
        _ => cell.to_string(),
    }
}
