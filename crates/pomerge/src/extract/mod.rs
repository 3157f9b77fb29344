//! The extraction strategy cascade.
//!
//! A strategy is any capability satisfying [`TextExtractor`]; the cascade
//! holds an ordered list and short-circuits on the first strategy whose text
//! yields a PO identifier. Ordering trades cost against reliability:
//! targeted recognition first, fast digital text second, exhaustive
//! full-page OCR last. Strategies can be reordered, disabled (e.g. when an
//! optional model artifact is absent) or replaced without touching the
//! cascade itself.

pub mod digital;
pub mod heuristics;
pub mod ocr;
pub mod raster;
pub mod sniper;

use std::path::Path;

use crate::document::DocType;
use crate::error::ExtractError;

pub use digital::DigitalTextExtractor;
pub use ocr::{FullPageOcrExtractor, OcrEngine};
pub use raster::PageRasterizer;
pub use sniper::{DetectedRegion, RegionClass, RegionDetector, SniperExtractor, TableCropProvider};

/// One extraction capability.
pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy is worth running for the given role.
    fn applies_to(&self, doc_type: DocType) -> bool {
        let _ = doc_type;
        true
    }

    /// Produces raw text from the document. Returning an empty string means
    /// "nothing found, try the next strategy"; an `Err` is a technical
    /// failure that fails the file.
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;

    /// Resolves a candidate identifier from this strategy's raw text.
    /// Crop-based strategies override this with a looser resolver.
    fn resolve_candidate(&self, raw_text: &str) -> Option<String> {
        heuristics::find_po_number(raw_text)
    }
}

/// Ordered, short-circuiting list of strategies.
pub struct ExtractionCascade {
    strategies: Vec<Box<dyn TextExtractor>>,
}

impl ExtractionCascade {
    pub fn new(strategies: Vec<Box<dyn TextExtractor>>) -> Self {
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Runs the cascade for one document.
    ///
    /// `Ok(Some(po))` on the first strategy that resolves an identifier —
    /// later, more expensive strategies never run. `Ok(None)` when every
    /// applicable strategy came up empty (a content problem, not an error).
    pub fn resolve(&self, path: &Path, doc_type: DocType) -> Result<Option<String>, ExtractError> {
        for strategy in &self.strategies {
            if !strategy.applies_to(doc_type) {
                log::debug!(
                    "Skipping strategy '{}' for {} document {}",
                    strategy.name(),
                    doc_type,
                    path.display()
                );
                continue;
            }

            let text = strategy.extract(path)?;
            if let Some(po_number) = strategy.resolve_candidate(&text) {
                log::info!(
                    "Strategy '{}' resolved {} -> {}",
                    strategy.name(),
                    path.display(),
                    po_number
                );
                return Ok(Some(po_number));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubStrategy {
        name: &'static str,
        text: &'static str,
        skip_role: Option<DocType>,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl StubStrategy {
        fn new(name: &'static str, text: &'static str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    text,
                    skip_role: None,
                    fail: false,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    impl TextExtractor for StubStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        fn applies_to(&self, doc_type: DocType) -> bool {
            self.skip_role != Some(doc_type)
        }

        fn extract(&self, _path: &Path) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExtractError::OcrFailed("stub failure".to_string()));
            }
            Ok(self.text.to_string())
        }
    }

    fn doc() -> PathBuf {
        PathBuf::from("/in/po/doc.pdf")
    }

    #[test]
    fn test_first_hit_short_circuits() {
        let (first, _) = StubStrategy::new("first", "Purchase Order No: PO-111222");
        let (second, second_calls) = StubStrategy::new("second", "Purchase Order No: PO-999999");
        let cascade = ExtractionCascade::new(vec![Box::new(first), Box::new(second)]);

        let result = cascade.resolve(&doc(), DocType::Po).unwrap();
        assert_eq!(result, Some("PO-111222".to_string()));
        // The later, more expensive strategy never ran.
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_falls_through_empty_strategies() {
        let (first, _) = StubStrategy::new("first", "");
        let (second, _) = StubStrategy::new("second", "nothing useful here");
        let (third, _) = StubStrategy::new("third", "P.O. No: PO-777333");
        let cascade =
            ExtractionCascade::new(vec![Box::new(first), Box::new(second), Box::new(third)]);

        let result = cascade.resolve(&doc(), DocType::Po).unwrap();
        assert_eq!(result, Some("PO-777333".to_string()));
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let (first, _) = StubStrategy::new("first", "");
        let (second, _) = StubStrategy::new("second", "");
        let cascade = ExtractionCascade::new(vec![Box::new(first), Box::new(second)]);

        assert_eq!(cascade.resolve(&doc(), DocType::Po).unwrap(), None);
    }

    #[test]
    fn test_role_gate_skips_strategy() {
        let (mut gated, gated_calls) = StubStrategy::new("digital", "P.O. No: PO-111222");
        gated.skip_role = Some(DocType::Do);
        let (fallback, _) = StubStrategy::new("ocr", "P.O. No: PO-444555");
        let cascade = ExtractionCascade::new(vec![Box::new(gated), Box::new(fallback)]);

        let result = cascade.resolve(&doc(), DocType::Do).unwrap();
        assert_eq!(result, Some("PO-444555".to_string()));
        assert_eq!(gated_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_technical_failure_propagates() {
        let (mut broken, _) = StubStrategy::new("broken", "");
        broken.fail = true;
        let cascade = ExtractionCascade::new(vec![Box::new(broken)]);

        assert!(cascade.resolve(&doc(), DocType::Po).is_err());
    }
}
