//! Crate-wide error taxonomy.
use thiserror::Error;

use crate::embedder::EmbedderError;
use crate::generator::GeneratorError;

/// Errors surfaced by the ingestion and query paths.
#[derive(Error, Debug)]
pub enum RagError {
    /// Bad chunking, retrieval or backend parameters. Caught before any work starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Vector length does not match the collection's dimensionality.
    #[error("dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The collection was built with a different embedding model.
    #[error(
        "collection '{collection}' was built with embedding model '{stored}', \
         refusing to use '{requested}'"
    )]
    EmbedderMismatch {
        collection: String,
        stored: String,
        requested: String,
    },

    /// Embedding or generation service unreachable or timed out.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend answered but refused the request or sent something unusable.
    /// Retrying will not help.
    #[error("backend error: {0}")]
    Backend(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("retriever unavailable: {0}")]
    RetrieverUnavailable(#[source] Box<RagError>),

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to load document: {0}")]
    Loader(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Only transient backend failures are worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Errors that invalidate the whole collection rather than a single document.
    #[must_use]
    pub fn is_fatal_for_index(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. }
                | Self::EmbedderMismatch { .. }
                | Self::CollectionNotFound(_)
        )
    }
}

impl From<EmbedderError> for RagError {
    fn from(err: EmbedderError) -> Self {
        match err {
            EmbedderError::EmptyInput => Self::EmptyInput("cannot embed zero-length text".into()),
            EmbedderError::BackendUnavailable(msg) => Self::BackendUnavailable(msg),
            EmbedderError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            other @ (EmbedderError::InferenceFailed(_)
            | EmbedderError::ModelLoadFailed(_)
            | EmbedderError::TokenizerError(_)) => Self::Backend(other.to_string()),
        }
    }
}

impl From<GeneratorError> for RagError {
    fn from(err: GeneratorError) -> Self {
        match err {
            GeneratorError::EmptyPrompt => {
                Self::EmptyInput("cannot generate from an empty prompt".into())
            }
            GeneratorError::BackendUnavailable(msg) => Self::BackendUnavailable(msg),
            other @ (GeneratorError::Rejected(_) | GeneratorError::InvalidResponse(_)) => {
                Self::Backend(other.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_backend_errors_are_retryable() {
        assert!(RagError::BackendUnavailable("down".into()).is_retryable());
        assert!(!RagError::EmptyInput("x".into()).is_retryable());
        assert!(!RagError::Backend("404 model not found".into()).is_retryable());
        assert!(!RagError::CollectionNotFound("c".into()).is_retryable());
        assert!(
            !RagError::RetrieverUnavailable(Box::new(RagError::BackendUnavailable("x".into())))
                .is_retryable()
        );
    }

    #[test]
    fn test_embedder_error_conversion() {
        let err: RagError = EmbedderError::EmptyInput.into();
        assert!(matches!(err, RagError::EmptyInput(_)));

        let err: RagError = EmbedderError::DimensionMismatch {
            expected: 384,
            actual: 768,
        }
        .into();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 384,
                actual: 768
            }
        ));
    }

    #[test]
    fn test_permanent_backend_errors_are_not_unavailable() {
        let err: RagError = EmbedderError::InferenceFailed("bad request".into()).into();
        assert!(matches!(err, RagError::Backend(_)));
        let err: RagError = EmbedderError::BackendUnavailable("connection reset".into()).into();
        assert!(matches!(err, RagError::BackendUnavailable(_)));

        let err: RagError = GeneratorError::Rejected("404: model not found".into()).into();
        assert!(matches!(&err, RagError::Backend(msg) if msg.contains("404")));
        let err: RagError = GeneratorError::InvalidResponse("eof".into()).into();
        assert!(!err.is_retryable());
        let err: RagError = GeneratorError::BackendUnavailable("503".into()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retriever_unavailable_keeps_source() {
        let err = RagError::RetrieverUnavailable(Box::new(RagError::BackendUnavailable(
            "connection refused".into(),
        )));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("backend unavailable: connection refused")
        );
    }
}
