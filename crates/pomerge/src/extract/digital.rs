//! Fast digital text extraction via lopdf.
//!
//! Cheap and effective for born-digital PDFs; useless for pure scans, which
//! is why the cascade gates it off for delivery notes (always scanned in
//! practice).

use std::path::Path;

use crate::document::DocType;
use crate::error::ExtractError;

use super::TextExtractor;

pub struct DigitalTextExtractor;

impl DigitalTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DigitalTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for DigitalTextExtractor {
    fn name(&self) -> &'static str {
        "digital"
    }

    fn applies_to(&self, doc_type: DocType) -> bool {
        // Delivery notes are scans; pulling their (nonexistent) text layer
        // is known-wasteful.
        doc_type != DocType::Do
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let pdf_bytes = std::fs::read(path).map_err(|e| ExtractError::ReadDocument {
            path: path.to_path_buf(),
            source: e,
        })?;

        let doc = match lopdf::Document::load_mem(&pdf_bytes) {
            Ok(doc) => doc,
            Err(e) => {
                // Not parseable as a PDF text source — a content problem the
                // OCR fallback may still solve, not a technical failure.
                log::warn!("lopdf failed to parse {}: {}", path.display(), e);
                return Ok(String::new());
            }
        };

        let mut text = String::new();
        for (page_num, _) in doc.get_pages() {
            if let Ok(page_text) = doc.extract_text(&[page_num]) {
                text.push_str(&page_text);
                text.push('\n');
            }
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::tests_support::write_test_pdf;

    #[test]
    fn test_extracts_text_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.pdf");
        write_test_pdf(&path, "Purchase Order No: PO-2024-0117");

        let extractor = DigitalTextExtractor::new();
        let text = extractor.extract(&path).unwrap();
        assert!(text.contains("PO-2024-0117"));
    }

    #[test]
    fn test_garbage_bytes_yield_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        let extractor = DigitalTextExtractor::new();
        assert_eq!(extractor.extract(&path).unwrap(), "");
    }

    #[test]
    fn test_missing_file_is_technical_failure() {
        let extractor = DigitalTextExtractor::new();
        let err = extractor.extract(Path::new("/nonexistent/x.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::ReadDocument { .. }));
    }

    #[test]
    fn test_gated_off_for_delivery_notes() {
        let extractor = DigitalTextExtractor::new();
        assert!(extractor.applies_to(DocType::Po));
        assert!(extractor.applies_to(DocType::Si));
        assert!(!extractor.applies_to(DocType::Do));
    }
}
