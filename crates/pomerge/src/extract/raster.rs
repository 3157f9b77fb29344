//! PDF page rasterization via poppler-utils.
//!
//! Shells out to `pdfinfo` for the page count and `pdftoppm` for rendering,
//! which handles far more PDF variants than any in-process parser. Both
//! tools must be on PATH for the OCR-based strategies to work.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;

use crate::error::ExtractError;

#[derive(Clone)]
pub struct PageRasterizer {
    dpi: u32,
}

impl PageRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Number of pages in the document, via `pdfinfo`.
    pub fn page_count(&self, path: &Path) -> Result<usize, ExtractError> {
        let output = Command::new("pdfinfo").arg(path).output().map_err(|e| {
            ExtractError::Rasterize(format!(
                "failed to run pdfinfo: {}. Is poppler-utils installed?",
                e
            ))
        })?;

        if !output.status.success() {
            return Err(ExtractError::Rasterize(format!(
                "pdfinfo failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            if let Some(rest) = line.strip_prefix("Pages:") {
                return rest.trim().parse::<usize>().map_err(|e| {
                    ExtractError::Rasterize(format!("unparsable pdfinfo page count: {}", e))
                });
            }
        }

        Err(ExtractError::Rasterize(format!(
            "pdfinfo output for {} carried no page count",
            path.display()
        )))
    }

    /// Renders one page (1-based) to an image via `pdftoppm`.
    pub fn render_page(&self, path: &Path, page: usize) -> Result<DynamicImage, ExtractError> {
        let work_dir =
            std::env::temp_dir().join(format!("pomerge_raster_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&work_dir).map_err(|e| {
            ExtractError::Rasterize(format!(
                "failed to create scratch dir {}: {}",
                work_dir.display(),
                e
            ))
        })?;

        let result = self.render_into(path, page, &work_dir);
        let _ = std::fs::remove_dir_all(&work_dir);
        result
    }

    fn render_into(
        &self,
        path: &Path,
        page: usize,
        work_dir: &Path,
    ) -> Result<DynamicImage, ExtractError> {
        let prefix = work_dir.join("page");
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg(path)
            .arg(&prefix)
            .output()
            .map_err(|e| {
                ExtractError::Rasterize(format!(
                    "failed to run pdftoppm: {}. Is poppler-utils installed?",
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(ExtractError::Rasterize(format!(
                "pdftoppm failed for {} page {}: {}",
                path.display(),
                page,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        // pdftoppm zero-pads the page suffix depending on the document's
        // total page count, so locate whatever single file it produced.
        let rendered = find_rendered_png(work_dir)?;
        image::open(&rendered)
            .map_err(|e| ExtractError::Rasterize(format!("failed to decode rendered page: {}", e)))
    }
}

fn find_rendered_png(work_dir: &Path) -> Result<PathBuf, ExtractError> {
    let entries = std::fs::read_dir(work_dir).map_err(|e| {
        ExtractError::Rasterize(format!("failed to list scratch dir: {}", e))
    })?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("png") {
            return Ok(path);
        }
    }
    Err(ExtractError::Rasterize(
        "pdftoppm produced no output page".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rasterizer_carries_dpi() {
        let raster = PageRasterizer::new(300);
        assert_eq!(raster.dpi(), 300);
    }

    #[test]
    fn test_page_count_on_missing_file() {
        let raster = PageRasterizer::new(150);
        // Either poppler is absent (spawn failure) or it rejects the path;
        // both surface as a rasterize error, never a panic.
        assert!(raster.page_count(Path::new("/nonexistent/x.pdf")).is_err());
    }

    #[test]
    fn test_find_rendered_png_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_rendered_png(dir.path()).is_err());
    }

    #[test]
    fn test_find_rendered_png_picks_png() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page-1.png"), b"stub").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"stub").unwrap();

        let found = find_rendered_png(dir.path()).unwrap();
        assert_eq!(found.extension().and_then(|e| e.to_str()), Some("png"));
    }
}
