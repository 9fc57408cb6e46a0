//! Error taxonomy for the retrieval core.
//!
//! Every library operation returns [`Result<T>`] with a [`RagError`]. The
//! variants map one-to-one onto the failure kinds the build and query paths
//! need to distinguish:
//!
//! | Kind | Raised by | Caller policy |
//! |------|-----------|---------------|
//! | [`Configuration`](RagError::Configuration), [`DimensionMismatch`](RagError::DimensionMismatch) | provider setup, index append | fatal to the operation |
//! | [`EmptySource`](RagError::EmptySource), [`NoDocuments`](RagError::NoDocuments), [`NoChunks`](RagError::NoChunks) | loaders, build | user-actionable, index untouched |
//! | [`IndexNotFound`](RagError::IndexNotFound), [`RetrieverUnavailable`](RagError::RetrieverUnavailable) | index load | "not ready for queries" |
//! | [`IndexPersist`](RagError::IndexPersist) | build | fatal, prior index preserved |
//! | [`AnswerGeneration`](RagError::AnswerGeneration) | model call | degraded answer |

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by loading, indexing, retrieval, and answer generation.
#[derive(Debug, Error)]
pub enum RagError {
    /// A required credential or setting is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding function does not match the dimensionality of an index.
    #[error("configuration error: embedding dimension mismatch (index has {expected}, embedder produces {actual})")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A file parsed successfully but contained no non-empty text.
    #[error("no valid text found in {}", path.display())]
    EmptySource { path: PathBuf },

    /// The external topic provider returned nothing usable.
    #[error("failed to load Wikipedia topic '{topic}': {message}")]
    ExternalSource { topic: String, message: String },

    /// A file has an extension no loader understands.
    #[error("unsupported source type: {}", path.display())]
    UnsupportedSource { path: PathBuf },

    /// The format parser rejected a file.
    #[error("failed to extract text from {}: {message}", path.display())]
    Extract { path: PathBuf, message: String },

    /// Every source failed or none was given.
    #[error("no documents loaded")]
    NoDocuments,

    /// Chunking produced no segments.
    #[error("no text chunks created")]
    NoChunks,

    /// The on-disk index is missing or incomplete.
    #[error("index not found or incomplete at {}: {reason}", path.display())]
    IndexNotFound { path: PathBuf, reason: String },

    /// Writing the index to disk failed; the previous index is intact.
    #[error("failed to persist index at {}: {message}", path.display())]
    IndexPersist { path: PathBuf, message: String },

    /// Another build holds the writer lock for this index.
    #[error("another build is in progress for {}", path.display())]
    BuildInProgress { path: PathBuf },

    /// No retriever could be constructed.
    #[error("retriever unavailable: {0}")]
    RetrieverUnavailable(String),

    /// A caller-supplied argument is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding service failed.
    #[error("embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    /// The language model call failed or timed out.
    #[error("answer generation failed: {0}")]
    AnswerGeneration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// True for errors that indicate a misconfigured system rather than bad input.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RagError::Configuration(_) | RagError::DimensionMismatch { .. }
        )
    }

    /// Actionable next step shown to the user alongside the error.
    pub fn user_hint(&self) -> Option<&'static str> {
        match self {
            RagError::Configuration(_) => {
                Some("Set the API key environment variable for the configured provider.")
            }
            RagError::DimensionMismatch { .. } => Some(
                "The index was built with a different embedding model; rebuild it into a new index path.",
            ),
            RagError::EmptySource { .. } | RagError::NoDocuments | RagError::NoChunks => {
                Some("Upload a document with readable text or pick another Wikipedia topic.")
            }
            RagError::ExternalSource { .. } => Some("Pick another Wikipedia topic."),
            RagError::UnsupportedSource { .. } => Some("Supported file types are .pdf, .docx, .txt and .md."),
            RagError::IndexNotFound { .. } | RagError::RetrieverUnavailable(_) => {
                Some("Build the index first with `ra build`.")
            }
            RagError::BuildInProgress { .. } => Some("Wait for the running build to finish."),
            _ => None,
        }
    }
}

/// Convenience result type for the retrieval core.
pub type Result<T> = std::result::Result<T, RagError>;
