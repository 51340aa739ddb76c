//! Error kinds surfaced by the ingestion and retrieval pipeline.
//!
//! Every variant maps to a distinct caller reaction: user-correctable
//! input problems, missing host capabilities, and the "nothing to search"
//! condition that tells the caller to re-ingest.

use thiserror::Error;

/// Main error type for pipeline operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The file type is not recognized. Carries the filename or MIME type verbatim.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A parser failed on a recognized format.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// The OCR engine (or its primary language model) is not installed.
    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    /// The embedding capability is missing or returned an error.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Stored vectors were produced by a different embedding method.
    #[error("embedding version mismatch for document {document_id}: index has {indexed}, query uses {query}")]
    EmbeddingVersionMismatch {
        document_id: String,
        indexed: String,
        query: String,
    },

    /// The generative capability is not configured or the call failed.
    #[error("generative capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// The search scope contains zero indexed chunks.
    #[error("no chunks available for {scope}; re-upload the document to enable queries")]
    NoChunksAvailable { scope: String },

    /// The input text is empty or whitespace only.
    #[error("document has no text content")]
    EmptyDocument,

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The storage collaborator failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// `NoChunksAvailable` scoped to one document.
    pub fn no_chunks_in_document(document_id: &str) -> Self {
        PipelineError::NoChunksAvailable {
            scope: format!("document {}", document_id),
        }
    }

    /// `NoChunksAvailable` scoped to the whole corpus.
    pub fn no_chunks_in_corpus() -> Self {
        PipelineError::NoChunksAvailable {
            scope: "the corpus".to_string(),
        }
    }

    /// Stable machine-readable code, used by the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::UnsupportedFormat(_) => "unsupported_format",
            PipelineError::ExtractionFailed(_) => "extraction_failed",
            PipelineError::OcrUnavailable(_) => "ocr_unavailable",
            PipelineError::EmbeddingUnavailable(_) => "embedding_unavailable",
            PipelineError::EmbeddingVersionMismatch { .. } => "embedding_version_mismatch",
            PipelineError::CapabilityUnavailable(_) => "capability_unavailable",
            PipelineError::NoChunksAvailable { .. } => "no_chunks",
            PipelineError::EmptyDocument => "empty_document",
            PipelineError::DocumentNotFound(_) => "not_found",
            PipelineError::InvalidInput(_) => "bad_request",
            PipelineError::Storage(_) => "internal",
        }
    }

    /// Message safe to show an end user.
    ///
    /// Parser internals are kept out of `ExtractionFailed`; callers log the
    /// full `Display` form instead.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ExtractionFailed(_) => {
                "Could not extract text from the document.".to_string()
            }
            PipelineError::Storage(_) => "Internal storage error.".to_string(),
            other => other.to_string(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
