//! Plain text and markdown files, loaded whole.
use std::path::Path;

use crate::document::{Document, MetadataValue};
use crate::error::Result;

use super::path_key;

pub fn load(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let source = path_key(path);
    Ok(vec![
        Document::new(source.clone(), content).with_metadata("source", MetadataValue::from(source)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Sockets\n\nAM5 and LGA1700.").unwrap();

        let docs = load(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].content.starts_with("# Sockets"));
        assert_eq!(
            docs[0].metadata.get("source").and_then(MetadataValue::as_str),
            Some(docs[0].source_id.as_str())
        );

        std::fs::write(&path, "  \n").unwrap();
        assert!(load(&path).unwrap().is_empty());
    }
}
