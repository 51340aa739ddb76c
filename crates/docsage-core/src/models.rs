//! Core data models used throughout docsage.
//!
//! These types represent the documents, chunks, and query results that flow
//! through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Detected document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    PlainText,
    Markdown,
    Csv,
    Html,
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    LegacyDoc,
    LegacyXls,
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
}

impl DocumentKind {
    /// Canonical MIME type for the kind.
    pub fn mime(&self) -> &'static str {
        match self {
            DocumentKind::PlainText => "text/plain",
            DocumentKind::Markdown => "text/markdown",
            DocumentKind::Csv => "text/csv",
            DocumentKind::Html => "text/html",
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            DocumentKind::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            DocumentKind::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            DocumentKind::LegacyDoc => "application/msword",
            DocumentKind::LegacyXls => "application/vnd.ms-excel",
            DocumentKind::Png => "image/png",
            DocumentKind::Jpeg => "image/jpeg",
            DocumentKind::Gif => "image/gif",
            DocumentKind::Bmp => "image/bmp",
            DocumentKind::Tiff => "image/tiff",
            DocumentKind::Webp => "image/webp",
        }
    }

    /// Reverse of [`mime`](Self::mime); also accepts a few common aliases.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        let kind = match essence.as_str() {
            "text/plain" => DocumentKind::PlainText,
            "text/markdown" | "text/x-markdown" => DocumentKind::Markdown,
            "text/csv" | "application/csv" => DocumentKind::Csv,
            "text/html" | "application/xhtml+xml" => DocumentKind::Html,
            "application/pdf" => DocumentKind::Pdf,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                DocumentKind::Docx
            }
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                DocumentKind::Xlsx
            }
            "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                DocumentKind::Pptx
            }
            "application/msword" => DocumentKind::LegacyDoc,
            "application/vnd.ms-excel" => DocumentKind::LegacyXls,
            "image/png" => DocumentKind::Png,
            "image/jpeg" | "image/jpg" => DocumentKind::Jpeg,
            "image/gif" => DocumentKind::Gif,
            "image/bmp" | "image/x-ms-bmp" => DocumentKind::Bmp,
            "image/tiff" => DocumentKind::Tiff,
            "image/webp" => DocumentKind::Webp,
            _ => return None,
        };
        Some(kind)
    }

    /// True for raster formats that go straight to OCR.
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            DocumentKind::Png
                | DocumentKind::Jpeg
                | DocumentKind::Gif
                | DocumentKind::Bmp
                | DocumentKind::Tiff
                | DocumentKind::Webp
        )
    }
}

/// An uploaded document as held by the storage collaborator.
///
/// Whether the document has a summary or retrievable chunks is derived
/// (summary nullness, chunk count) rather than tracked as flags.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub summary: Option<String>,
}

/// Listing row: document metadata without the full text.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub char_count: usize,
    pub chunk_count: usize,
    pub summary: Option<String>,
}

/// A contiguous span of a document's text.
///
/// `char_start..char_end` are character (not byte) offsets into the source
/// text. Consecutive chunks may overlap in that range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub text: String,
    pub char_start: usize,
    pub char_end: usize,
    pub hash: String,
}

/// A chunk ranked against a query vector.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Which path produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Generated,
    Extracted,
    NoMatch,
}

/// Which path produced a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMode {
    Generated,
    Extractive,
}

/// One ranked chunk cited as evidence for an answer.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub ordinal: usize,
    pub score: f32,
    pub excerpt: String,
}

/// Ephemeral result of a query; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub mode: AnswerMode,
    pub document_id: String,
    pub filename: String,
    pub evidence: Vec<Evidence>,
}

/// Result of ingesting one upload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub filename: String,
    pub kind: DocumentKind,
    pub text: String,
    pub char_count: usize,
    pub truncated: bool,
    pub chunk_count: usize,
    /// Set when the document was stored but could not be indexed.
    pub embedding_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutcome {
    pub document_id: String,
    pub filename: String,
    pub summary: String,
    pub mode: Option<SummaryMode>,
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_roundtrip_for_every_kind() {
        let kinds = [
            DocumentKind::PlainText,
            DocumentKind::Markdown,
            DocumentKind::Csv,
            DocumentKind::Html,
            DocumentKind::Pdf,
            DocumentKind::Docx,
            DocumentKind::Xlsx,
            DocumentKind::Pptx,
            DocumentKind::LegacyDoc,
            DocumentKind::LegacyXls,
            DocumentKind::Png,
            DocumentKind::Jpeg,
            DocumentKind::Gif,
            DocumentKind::Bmp,
            DocumentKind::Tiff,
            DocumentKind::Webp,
        ];
        for kind in kinds {
            assert_eq!(DocumentKind::from_mime(kind.mime()), Some(kind));
        }
    }

    #[test]
    fn test_from_mime_ignores_parameters() {
        assert_eq!(
            DocumentKind::from_mime("text/html; charset=utf-8"),
            Some(DocumentKind::Html)
        );
        assert_eq!(DocumentKind::from_mime("application/octet-stream"), None);
    }
}
