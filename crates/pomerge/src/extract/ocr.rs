//! Tesseract OCR engine and the exhaustive full-page fallback strategy.

use std::io::Cursor;
use std::path::Path;

use image::DynamicImage;

use crate::error::ExtractError;

use super::raster::PageRasterizer;
use super::TextExtractor;

/// Thin wrapper over leptess. A fresh `LepTess` is built per call because
/// the handle is not `Sync`; initialization is cheap next to recognition.
#[derive(Clone)]
pub struct OcrEngine {
    languages: String,
}

impl OcrEngine {
    pub fn new(languages: &[String]) -> Self {
        let languages = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };
        Self { languages }
    }

    /// Recognizes text in an image.
    pub fn recognize(&self, image: &DynamicImage) -> Result<String, ExtractError> {
        let _span = tracing::info_span!("extract.ocr").entered();

        // leptess wants encoded bytes; PNG keeps the crop lossless.
        let mut png_data = Vec::new();
        let mut cursor = Cursor::new(&mut png_data);
        image
            .write_to(&mut cursor, image::ImageFormat::Png)
            .map_err(|e| ExtractError::OcrFailed(format!("failed to encode image: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.languages).map_err(|e| {
            ExtractError::OcrFailed(format!("failed to initialize Tesseract: {}", e))
        })?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ExtractError::OcrFailed(format!("failed to set image for OCR: {}", e)))?;

        lt.get_utf8_text()
            .map_err(|e| ExtractError::OcrFailed(format!("OCR failed: {}", e)))
    }
}

/// Last-resort strategy: rasterize every page (bounded) and OCR the lot.
/// Most expensive by far, which is why the cascade runs it last.
pub struct FullPageOcrExtractor {
    ocr: OcrEngine,
    raster: PageRasterizer,
    max_pages: usize,
}

impl FullPageOcrExtractor {
    pub fn new(ocr: OcrEngine, raster: PageRasterizer, max_pages: usize) -> Self {
        Self {
            ocr,
            raster,
            max_pages,
        }
    }
}

impl TextExtractor for FullPageOcrExtractor {
    fn name(&self) -> &'static str {
        "full-page-ocr"
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let _span = tracing::info_span!("extract.full_page_ocr").entered();

        let page_count = self.raster.page_count(path)?.min(self.max_pages);

        let mut all_text = String::new();
        for page in 1..=page_count {
            let rendered = self.raster.render_page(path, page)?;
            let page_text = self.ocr.recognize(&rendered)?;
            all_text.push_str(&page_text);
            all_text.push('\n');
        }
        Ok(all_text)
    }
}
