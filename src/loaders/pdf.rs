//! PDF guides: one document per page.
use std::path::Path;

use tracing::debug;

use crate::document::{Document, Metadata, MetadataValue};
use crate::error::{RagError, Result};

use super::path_key;

pub fn load(path: &Path) -> Result<Vec<Document>> {
    let source = path_key(path);
    let pdf = lopdf::Document::load(path).map_err(|e| RagError::Loader(format!("{source}: {e}")))?;

    let mut documents = Vec::new();
    for page in pdf.get_pages().into_keys() {
        let text = match pdf.extract_text(&[page]) {
            Ok(text) => text,
            Err(e) => {
                debug!(file = %source, page, error = %e, "no extractable text");
                continue;
            }
        };
        if text.trim().is_empty() {
            continue;
        }

        let mut metadata = Metadata::new();
        metadata.insert("source".into(), MetadataValue::from(source.as_str()));
        metadata.insert("page".into(), MetadataValue::Integer(i64::from(page)));
        documents.push(Document {
            source_id: format!("{source}:page{page}"),
            content: text,
            metadata,
        });
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// Build a PDF whose pages carry the given strings (empty = blank page).
    fn write_pdf(path: &Path, pages: &[&str]) {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let ops = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations: ops };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_one_document_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cpu_guide.pdf");
        write_pdf(&path, &["Sockets matter", "", "TDP limits"]);

        let docs = load(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].content.contains("Sockets matter"));
        assert_eq!(docs[0].metadata.get("page"), Some(&MetadataValue::Integer(1)));
        assert_eq!(docs[1].metadata.get("page"), Some(&MetadataValue::Integer(3)));
        assert!(docs[1].source_id.ends_with("cpu_guide.pdf:page3"));
    }

    #[test]
    fn test_invalid_pdf_is_loader_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, "plain text").unwrap();
        assert!(matches!(load(&path), Err(RagError::Loader(_))));
    }
}
