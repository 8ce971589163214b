//! Source adapters turning files on disk into [`Document`]s.
//!
//! Each adapter produces the same `(source_id, content, metadata)` shape;
//! nothing downstream knows which file type a document came from.
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{is_supported_file, walk_supported};
use crate::document::Document;
use crate::error::{RagError, Result};

pub mod csv;
pub mod pdf;
pub mod text;

/// Documents loaded from a set of paths, plus the files that failed.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub failures: Vec<(PathBuf, RagError)>,
}

/// Load one file, dispatching on its extension.
pub fn load_path(path: &Path) -> Result<Vec<Document>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => csv::load(path),
        "pdf" => pdf::load(path),
        "txt" | "md" => text::load(path),
        _ => Err(RagError::Loader(format!(
            "unsupported file type: {}",
            path.display()
        ))),
    }
}

/// Load every supported file under `paths`, walking directories.
///
/// A file that fails to load is recorded in [`LoadOutcome::failures`] and
/// the rest are still loaded.
pub fn load_paths(paths: &[PathBuf]) -> LoadOutcome {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(walk_supported(path));
        } else if is_supported_file(path) {
            files.push(path.clone());
        } else {
            warn!("Skipping unsupported file: {}", path.display());
        }
    }
    files.sort();
    files.dedup();

    let mut outcome = LoadOutcome::default();
    for file in files {
        match load_path(&file) {
            Ok(docs) => {
                info!(file = %file.display(), documents = docs.len(), "loaded");
                outcome.documents.extend(docs);
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "failed to load");
                outcome.failures.push((file, e));
            }
        }
    }
    outcome
}

/// Stable, separator-normalized string form of a path.
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
