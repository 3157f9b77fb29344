//! The specialist ("sniper") strategy: targeted region detection plus a
//! focused read of only the detected crops.
//!
//! Object detection itself is an injected capability behind
//! [`RegionDetector`]; this module owns everything around it — page
//! rasterization, crop geometry, the rotation spin cycle for vertical
//! labels, and the table-crop feed for the line-item path. Detector failures
//! degrade to an empty reading so the cascade can fall through.

use std::path::Path;
use std::sync::Arc;

use image::DynamicImage;

use crate::error::ExtractError;

use super::heuristics;
use super::ocr::OcrEngine;
use super::raster::PageRasterizer;
use super::TextExtractor;

/// Region classes the detector can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionClass {
    /// The PO identifier box (header stamp or printed field).
    PoNumber,
    /// A line-item table body.
    LineTable,
}

/// One detected region in page-pixel coordinates.
#[derive(Debug, Clone)]
pub struct DetectedRegion {
    pub class: RegionClass,
    pub confidence: f32,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

/// Capability boundary for object detection. The production detector is an
/// external model artifact; tests inject stubs.
pub trait RegionDetector: Send + Sync {
    fn detect(&self, page: &DynamicImage) -> Result<Vec<DetectedRegion>, ExtractError>;
}

/// Capability consumed by the pipeline's line-item path.
pub trait TableCropProvider: Send + Sync {
    fn extract_table_crops(&self, path: &Path) -> Result<Vec<DynamicImage>, ExtractError>;
}

/// Detections below this confidence are noise.
const CONFIDENCE_THRESHOLD: f32 = 0.30;

/// Pixels of margin added around a detected box before cropping; detectors
/// habitually shave the last glyph.
const CROP_MARGIN: u32 = 5;

pub struct SniperExtractor {
    detector: Arc<dyn RegionDetector>,
    ocr: OcrEngine,
    raster: PageRasterizer,
    max_pages: usize,
}

impl SniperExtractor {
    pub fn new(
        detector: Arc<dyn RegionDetector>,
        ocr: OcrEngine,
        raster: PageRasterizer,
        max_pages: usize,
    ) -> Self {
        Self {
            detector,
            ocr,
            raster,
            max_pages,
        }
    }

    fn crop_region(page: &DynamicImage, region: &DetectedRegion) -> DynamicImage {
        let x1 = region.x1.saturating_sub(CROP_MARGIN);
        let y1 = region.y1.saturating_sub(CROP_MARGIN);
        let x2 = (region.x2 + CROP_MARGIN).min(page.width());
        let y2 = (region.y2 + CROP_MARGIN).min(page.height());
        if x2 <= x1 || y2 <= y1 {
            return page.clone();
        }
        page.crop_imm(x1, y1, x2 - x1, y2 - y1)
    }

    /// OCRs a crop at 0°, 90° CW and 90° CCW — PO stamps are frequently
    /// printed along the page edge. First plausible reading wins.
    fn spin_cycle(&self, crop: &DynamicImage) -> Option<String> {
        let rotations = [
            crop.clone(),
            crop.rotate90(),
            crop.rotate270(),
        ];

        for candidate in &rotations {
            let text = match self.ocr.recognize(candidate) {
                Ok(text) => text,
                Err(e) => {
                    log::debug!("Sniper crop OCR failed: {}", e);
                    continue;
                }
            };
            let clean = text.trim().to_ascii_uppercase();
            let digits = clean.chars().filter(|c| c.is_ascii_digit()).count();
            if clean.len() >= 6 && digits >= 4 {
                return Some(clean);
            }
        }
        None
    }

    fn detect_regions(
        &self,
        path: &Path,
        wanted: RegionClass,
    ) -> Result<Vec<(DynamicImage, DetectedRegion)>, ExtractError> {
        let page_count = self.raster.page_count(path)?.min(self.max_pages);

        let mut crops = Vec::new();
        for page_num in 1..=page_count {
            let page = self.raster.render_page(path, page_num)?;
            let regions = match self.detector.detect(&page) {
                Ok(regions) => regions,
                Err(e) => {
                    log::warn!(
                        "Detector failed on {} page {}: {}",
                        path.display(),
                        page_num,
                        e
                    );
                    continue;
                }
            };

            for region in regions {
                if region.class != wanted || region.confidence < CONFIDENCE_THRESHOLD {
                    continue;
                }
                let crop = Self::crop_region(&page, &region);
                crops.push((crop, region));
            }
        }
        Ok(crops)
    }
}

impl TextExtractor for SniperExtractor {
    fn name(&self) -> &'static str {
        "sniper"
    }

    fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let _span = tracing::info_span!("extract.sniper").entered();

        // The sniper is an optional accelerator: anything going wrong inside
        // it must not fail the file while cheaper fallbacks remain.
        let crops = match self.detect_regions(path, RegionClass::PoNumber) {
            Ok(crops) => crops,
            Err(e) => {
                log::warn!("Sniper could not scan {}: {}", path.display(), e);
                return Ok(String::new());
            }
        };

        let mut readings = Vec::new();
        for (crop, region) in &crops {
            if let Some(text) = self.spin_cycle(crop) {
                log::debug!(
                    "Sniper read '{}' from region ({},{})-({},{})",
                    text,
                    region.x1,
                    region.y1,
                    region.x2,
                    region.y2
                );
                readings.push(text);
            }
        }
        Ok(readings.join("\n"))
    }

    fn resolve_candidate(&self, raw_text: &str) -> Option<String> {
        heuristics::rescue_sniper_hit(raw_text)
    }
}

impl TableCropProvider for SniperExtractor {
    fn extract_table_crops(&self, path: &Path) -> Result<Vec<DynamicImage>, ExtractError> {
        let crops = self.detect_regions(path, RegionClass::LineTable)?;
        Ok(crops.into_iter().map(|(crop, _)| crop).collect())
    }
}
