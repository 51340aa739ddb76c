//! PDF extraction.
//!
//! The text layer is read with `pdf-extract`. When it is empty (a scanned
//! document) the embedded page images are pulled out with `lopdf` and run
//! through OCR in page order. JPEG streams are passed through unchanged;
//! Flate-compressed raw pixels are re-encoded as PNG first.

use std::io::Read;

use flate2::read::ZlibDecoder;
use lopdf::Document;

use docsage_core::{PipelineError, PipelineResult};

use super::ocr::OcrEngine;

/// Images smaller than this on either side are icons or rules, not text.
const MIN_DIMENSION: i64 = 32;
/// Upper bound on images sent to OCR per document.
const MAX_IMAGES: usize = 500;

pub fn extract_pdf(bytes: &[u8], ocr: &OcrEngine) -> PipelineResult<String> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| PipelineError::ExtractionFailed(format!("PDF: {}", e)))?;

    // pdf-extract panics on some malformed content streams.
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) if !text.trim().is_empty() => return Ok(text),
        Ok(Ok(_)) => tracing::info!("PDF has no text layer, trying OCR"),
        Ok(Err(e)) => tracing::warn!(error = %e, "PDF text layer unreadable, trying OCR"),
        Err(_) => tracing::warn!("PDF text extraction panicked, trying OCR"),
    }

    ocr.ensure_available()?;

    let images = page_images(&doc);
    if images.is_empty() {
        return Err(PipelineError::ExtractionFailed(
            "PDF has neither a text layer nor page images".to_string(),
        ));
    }

    let mut pages = Vec::with_capacity(images.len());
    for (page, image) in images {
        tracing::debug!(page, bytes = image.len(), "ocr pdf page image");
        let text = ocr.recognize(&image)?;
        if !text.trim().is_empty() {
            pages.push(text.trim().to_string());
        }
    }
    Ok(pages.join("\n\n"))
}

/// Encoded page images in page order, as `(page_number, bytes)`.
fn page_images(doc: &Document) -> Vec<(u32, Vec<u8>)> {
    let mut out = Vec::new();
    for (page_num, page_id) in doc.get_pages() {
        let images = match doc.get_page_images(page_id) {
            Ok(images) => images,
            Err(e) => {
                tracing::debug!(page = page_num, error = %e, "no images on page");
                continue;
            }
        };
        for image in images {
            if out.len() >= MAX_IMAGES {
                tracing::warn!(limit = MAX_IMAGES, "image limit reached, remaining pages skipped");
                return out;
            }
            if image.width < MIN_DIMENSION || image.height < MIN_DIMENSION {
                continue;
            }
            if let Some(encoded) = encode_image(&image) {
                out.push((page_num, encoded));
            }
        }
    }
    out
}

fn encode_image(pdf_image: &lopdf::xobject::PdfImage) -> Option<Vec<u8>> {
    let filters = pdf_image.filters.as_ref()?;
    if filters.iter().any(|f| f == "DCTDecode") {
        Some(pdf_image.content.to_vec())
    } else if filters.iter().any(|f| f == "FlateDecode") {
        match flate_to_png(pdf_image) {
            Ok(png) => Some(png),
            Err(e) => {
                tracing::debug!(error = %e, "cannot decode FlateDecode image");
                None
            }
        }
    } else {
        tracing::debug!(?filters, "unsupported image filter");
        None
    }
}

fn flate_to_png(pdf_image: &lopdf::xobject::PdfImage) -> Result<Vec<u8>, String> {
    let mut raw = Vec::new();
    ZlibDecoder::new(pdf_image.content)
        .read_to_end(&mut raw)
        .map_err(|e| format!("decompression failed: {e}"))?;

    let (width, height) = (pdf_image.width as u32, pdf_image.height as u32);
    let color_space = pdf_image.color_space.as_deref().unwrap_or("DeviceRGB");
    let decoded = match color_space {
        "DeviceGray" | "Gray" => {
            image::GrayImage::from_raw(width, height, raw).map(image::DynamicImage::ImageLuma8)
        }
        "DeviceCMYK" | "CMYK" => image::RgbImage::from_raw(width, height, cmyk_to_rgb(&raw))
            .map(image::DynamicImage::ImageRgb8),
        _ => image::RgbImage::from_raw(width, height, raw).map(image::DynamicImage::ImageRgb8),
    }
    .ok_or_else(|| format!("pixel data does not match {}x{} {}", width, height, color_space))?;

    let mut png = Vec::new();
    decoded
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| format!("PNG encoding failed: {e}"))?;
    Ok(png)
}

fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk.len() / 4 * 3);
    for px in cmyk.chunks_exact(4) {
        let k = 1.0 - f32::from(px[3]) / 255.0;
        for &channel in &px[..3] {
            rgb.push((255.0 * (1.0 - f32::from(channel) / 255.0) * k) as u8);
        }
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrConfig;

    fn no_ocr() -> OcrEngine {
        OcrEngine::new(&OcrConfig {
            binary: "docsage-test-no-such-tesseract".to_string(),
            ..OcrConfig::default()
        })
    }

    #[test]
    fn test_invalid_pdf_is_extraction_failure() {
        assert!(matches!(
            extract_pdf(b"not a pdf", &no_ocr()),
            Err(PipelineError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn test_cmyk_conversion() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0, 0, 0, 0, 255]), vec![255, 255, 255, 0, 0, 0]);
    }
}
