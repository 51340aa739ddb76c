//! Multi-format text extraction.
//!
//! [`Extractor::extract`] turns raw upload bytes into normalized UTF-8 text.
//! The format is detected from the declared MIME type, then the filename
//! extension, then magic bytes. Extraction is CPU-bound and synchronous;
//! async callers run it on a blocking worker.

pub mod html;
pub mod ocr;
pub mod office;
pub mod pdf;
pub mod text;

use std::path::Path;
use std::sync::Arc;

use docsage_core::models::DocumentKind;
use docsage_core::{PipelineError, PipelineResult};

use crate::config::{ExtractionConfig, OcrConfig};
use ocr::OcrEngine;

/// Output of a successful extraction.
#[derive(Debug, Clone)]
pub struct Extracted {
    pub kind: DocumentKind,
    pub text: String,
    /// True when the text was cut at `extraction.max_chars`.
    pub truncated: bool,
}

#[derive(Clone)]
pub struct Extractor {
    ocr: Arc<OcrEngine>,
    max_chars: usize,
    max_file_bytes: u64,
}

impl Extractor {
    pub fn new(extraction: &ExtractionConfig, ocr: &OcrConfig) -> Self {
        Self {
            ocr: Arc::new(OcrEngine::new(ocr)),
            max_chars: extraction.max_chars,
            max_file_bytes: extraction.max_file_bytes,
        }
    }

    /// Detect, extract, normalize and cap.
    ///
    /// Fails with `UnsupportedFormat`, `ExtractionFailed` or `OcrUnavailable`.
    /// A recognized file that yields no text is `ExtractionFailed`.
    pub fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
        declared_mime: Option<&str>,
    ) -> PipelineResult<Extracted> {
        if bytes.len() as u64 > self.max_file_bytes {
            return Err(PipelineError::InvalidInput(format!(
                "{} is {} bytes; the limit is {}",
                filename,
                bytes.len(),
                self.max_file_bytes
            )));
        }
        let kind = detect_kind(bytes, filename, declared_mime)?;
        tracing::debug!(filename, kind = ?kind, bytes = bytes.len(), "extracting");

        let raw = self.extract_raw(kind, bytes)?;
        let normalized = normalize(&raw);
        if normalized.is_empty() {
            return Err(PipelineError::ExtractionFailed(format!(
                "no text could be extracted from {}",
                filename
            )));
        }
        let (text, truncated) = cap_chars(normalized, self.max_chars);
        if truncated {
            tracing::warn!(filename, max_chars = self.max_chars, "extracted text truncated");
        }
        Ok(Extracted {
            kind,
            text,
            truncated,
        })
    }

    fn extract_raw(&self, kind: DocumentKind, bytes: &[u8]) -> PipelineResult<String> {
        match kind {
            DocumentKind::PlainText => Ok(text::decode_text(bytes)),
            DocumentKind::Markdown => Ok(text::strip_markdown(&text::decode_text(bytes))),
            DocumentKind::Csv => Ok(text::csv_to_text(&text::decode_text(bytes))),
            DocumentKind::Html => Ok(html::html_to_text(&text::decode_text(bytes))),
            DocumentKind::Pdf => pdf::extract_pdf(bytes, &self.ocr),
            DocumentKind::Docx => office::extract_docx(bytes),
            DocumentKind::Xlsx => office::extract_xlsx(bytes),
            DocumentKind::Pptx => office::extract_pptx(bytes),
            DocumentKind::LegacyDoc | DocumentKind::LegacyXls => Ok(text::recover_strings(bytes)),
            k if k.is_image() => self.ocr.recognize(bytes),
            k => Err(PipelineError::UnsupportedFormat(k.mime().to_string())),
        }
    }
}

/// Resolve the document kind: declared MIME type, extension, magic bytes.
///
/// Unknown input fails with `UnsupportedFormat` carrying the filename.
pub fn detect_kind(
    bytes: &[u8],
    filename: &str,
    declared_mime: Option<&str>,
) -> PipelineResult<DocumentKind> {
    if let Some(kind) = declared_mime.and_then(DocumentKind::from_mime) {
        return Ok(kind);
    }
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    if let Some(kind) = ext.as_deref().and_then(kind_from_extension) {
        return Ok(kind);
    }
    if let Some(kind) = sniff(bytes) {
        return Ok(kind);
    }
    if ext.is_none() && looks_like_text(bytes) {
        return Ok(DocumentKind::PlainText);
    }
    Err(PipelineError::UnsupportedFormat(
        if filename.is_empty() {
            declared_mime.unwrap_or("unknown").to_string()
        } else {
            filename.to_string()
        },
    ))
}

fn kind_from_extension(ext: &str) -> Option<DocumentKind> {
    let kind = match ext {
        "txt" | "text" | "log" => DocumentKind::PlainText,
        "md" | "markdown" => DocumentKind::Markdown,
        "csv" => DocumentKind::Csv,
        "html" | "htm" | "xhtml" => DocumentKind::Html,
        "pdf" => DocumentKind::Pdf,
        "docx" => DocumentKind::Docx,
        "xlsx" => DocumentKind::Xlsx,
        "pptx" => DocumentKind::Pptx,
        "doc" => DocumentKind::LegacyDoc,
        "xls" => DocumentKind::LegacyXls,
        "png" => DocumentKind::Png,
        "jpg" | "jpeg" => DocumentKind::Jpeg,
        "gif" => DocumentKind::Gif,
        "bmp" => DocumentKind::Bmp,
        "tif" | "tiff" => DocumentKind::Tiff,
        "webp" => DocumentKind::Webp,
        _ => return None,
    };
    Some(kind)
}

/// Identify a format from its leading bytes.
pub fn sniff(bytes: &[u8]) -> Option<DocumentKind> {
    if bytes.starts_with(b"%PDF") {
        return Some(DocumentKind::Pdf);
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(DocumentKind::Png);
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(DocumentKind::Jpeg);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(DocumentKind::Gif);
    }
    if bytes.starts_with(b"BM") && bytes.len() > 14 {
        return Some(DocumentKind::Bmp);
    }
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return Some(DocumentKind::Tiff);
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(DocumentKind::Webp);
    }
    if bytes.starts_with(b"PK\x03\x04") {
        let names = office::zip_entry_names(bytes)?;
        let has = |prefix: &str| names.iter().any(|n| n.starts_with(prefix));
        return if has("word/") {
            Some(DocumentKind::Docx)
        } else if has("xl/") {
            Some(DocumentKind::Xlsx)
        } else if has("ppt/") {
            Some(DocumentKind::Pptx)
        } else {
            None
        };
    }
    if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        // OLE compound file; Excel workbooks name their stream "Workbook".
        let wide_workbook: Vec<u8> = "Workbook".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let is_xls = bytes.windows(wide_workbook.len()).any(|w| w == wide_workbook.as_slice());
        return Some(if is_xls {
            DocumentKind::LegacyXls
        } else {
            DocumentKind::LegacyDoc
        });
    }
    None
}

fn looks_like_text(bytes: &[u8]) -> bool {
    !bytes.is_empty() && !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
}

/// Normalize extracted text: LF line endings, no control characters, no
/// trailing spaces, at most one blank line in a row, trimmed.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace(['\r', '\u{c}'], "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0usize;
    for line in unified.split('\n') {
        let cleaned: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let cleaned = cleaned.trim_end();
        if cleaned.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(cleaned);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Cut `text` to at most `max_chars` characters.
pub fn cap_chars(text: String, max_chars: usize) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => (text[..byte].trim_end().to_string(), true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::office::fixtures::{docx, zip_of};

    fn extractor() -> Extractor {
        Extractor::new(
            &ExtractionConfig::default(),
            &OcrConfig {
                binary: "docsage-test-no-such-tesseract".to_string(),
                ..OcrConfig::default()
            },
        )
    }

    #[test]
    fn test_detect_prefers_declared_then_extension_then_magic() {
        assert_eq!(
            detect_kind(b"%PDF-1.4", "notes.txt", Some("text/html")).unwrap(),
            DocumentKind::Html
        );
        assert_eq!(
            detect_kind(b"%PDF-1.4", "notes.txt", Some("application/octet-stream")).unwrap(),
            DocumentKind::PlainText
        );
        assert_eq!(detect_kind(b"%PDF-1.4", "upload", None).unwrap(), DocumentKind::Pdf);
        assert_eq!(detect_kind(b"plain words", "README", None).unwrap(), DocumentKind::PlainText);
    }

    #[test]
    fn test_detect_zip_flavours() {
        assert_eq!(sniff(&docx(&["x"])), Some(DocumentKind::Docx));
        assert_eq!(sniff(&zip_of(&[("xl/workbook.xml", "<w/>")])), Some(DocumentKind::Xlsx));
        assert_eq!(sniff(&zip_of(&[("ppt/presentation.xml", "<p/>")])), Some(DocumentKind::Pptx));
        assert_eq!(sniff(&zip_of(&[("other.txt", "x")])), None);
    }

    #[test]
    fn test_detect_images() {
        assert_eq!(sniff(b"\x89PNG\r\n\x1a\n...."), Some(DocumentKind::Png));
        assert_eq!(sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(DocumentKind::Jpeg));
        assert_eq!(sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(DocumentKind::Webp));
        assert_eq!(sniff(b"II*\0rest"), Some(DocumentKind::Tiff));
    }

    #[test]
    fn test_unknown_format_carries_filename() {
        let err = detect_kind(&[0, 1, 2, 3], "archive.xyz", None).unwrap_err();
        assert_eq!(err, PipelineError::UnsupportedFormat("archive.xyz".to_string()));
    }

    #[test]
    fn test_normalize() {
        let raw = "  Title\r\n\r\n\r\n\r\nBody line   \x07\nnext\u{c}page\n\n\n";
        assert_eq!(normalize(raw), "Title\n\nBody line\nnext\npage");
    }

    #[test]
    fn test_cap_chars_on_char_boundary() {
        let (text, truncated) = cap_chars("ก".repeat(10), 4);
        assert_eq!(text, "กกกก");
        assert!(truncated);
        let (text, truncated) = cap_chars("short".to_string(), 10);
        assert_eq!(text, "short");
        assert!(!truncated);
    }

    #[test]
    fn test_extract_truncates_and_flags() {
        let ex = Extractor::new(
            &ExtractionConfig {
                max_chars: 10,
                ..ExtractionConfig::default()
            },
            &OcrConfig::default(),
        );
        let out = ex.extract(b"abcdefghijklmnop", "a.txt", None).unwrap();
        assert_eq!(out.text, "abcdefghij");
        assert!(out.truncated);
    }

    #[test]
    fn test_extract_docx_end_to_end() {
        let out = extractor()
            .extract(&docx(&["Hello", "World"]), "report.docx", None)
            .unwrap();
        assert_eq!(out.kind, DocumentKind::Docx);
        assert_eq!(out.text, "Hello\nWorld");
    }

    #[test]
    fn test_image_without_ocr_is_unavailable() {
        let err = extractor()
            .extract(b"\x89PNG\r\n\x1a\nfake", "scan.png", None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::OcrUnavailable(_)));
    }

    #[test]
    fn test_whitespace_only_is_extraction_failure() {
        let err = extractor().extract(b"  \n\t\n", "blank.txt", None).unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionFailed(_)));
    }
}
