//! The sequential pipeline: scan, process, merge.
//!
//! One `run()` is one full pass. Failures are contained at the smallest
//! sensible unit — a file that cannot be processed fails that file, a bundle
//! that cannot be merged skips that bundle — while ledger errors abort the
//! pass, since nothing downstream can be trusted without the ledger.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::db::{file_repo, item_repo, Database};
use crate::db::file_repo::StatusPatch;
use crate::document::{DocType, FileStatus};
use crate::error::{RecognizerError, Result};
use crate::extract::{
    DigitalTextExtractor, ExtractionCascade, FullPageOcrExtractor, OcrEngine, PageRasterizer,
    RegionDetector, SniperExtractor, TableCropProvider,
};
use crate::linker::link_line_items;
use crate::merge::{evaluate_gate, merge_bundle, sort_bundle, MergeDecision};
use crate::recognizer::{GeminiRecognizer, LineItemRecognizer};
use crate::reconcile::reconcile;
use crate::scanner::InputScanner;
use crate::storage::FileStorage;

/// Counters for one pass, for the log and for tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub discovered: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub manual_review: u64,
    pub merged_bundles: u64,
    pub skipped_bundles: u64,
}

pub struct PipelineOrchestrator {
    db: Database,
    scanner: InputScanner,
    cascade: ExtractionCascade,
    table_crops: Option<Arc<dyn TableCropProvider>>,
    recognizer: Option<Box<dyn LineItemRecognizer>>,
    storage: FileStorage,
}

impl PipelineOrchestrator {
    /// Full dependency injection, used by tests and embedders.
    pub fn new(
        db: Database,
        scanner: InputScanner,
        cascade: ExtractionCascade,
        table_crops: Option<Arc<dyn TableCropProvider>>,
        recognizer: Option<Box<dyn LineItemRecognizer>>,
        storage: FileStorage,
    ) -> Self {
        Self {
            db,
            scanner,
            cascade,
            table_crops,
            recognizer,
            storage,
        }
    }

    /// Standard assembly: digital text first, full-page OCR as fallback.
    /// The cloud recognizer is attached when its credential is present.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::assemble(config, None)
    }

    /// Standard assembly plus the targeted-region strategy, which runs
    /// before everything else and also feeds the line-item path.
    pub fn from_config_with_detector(
        config: &Config,
        detector: Arc<dyn RegionDetector>,
    ) -> Result<Self> {
        Self::assemble(config, Some(detector))
    }

    fn assemble(config: &Config, detector: Option<Arc<dyn RegionDetector>>) -> Result<Self> {
        let db = Database::open(&config.resolved_database_path())?;
        let scanner = InputScanner::new(&config.input_directory);
        let storage = FileStorage::new(&config.output_directory);

        let ocr = OcrEngine::new(&config.ocr.languages);
        let raster = PageRasterizer::new(config.ocr.dpi);
        let max_pages = config.ocr.max_pages as usize;

        let mut strategies: Vec<Box<dyn crate::extract::TextExtractor>> = Vec::new();
        let mut table_crops: Option<Arc<dyn TableCropProvider>> = None;
        if detector.is_none() {
            log::info!(
                "No region detector configured; targeted extraction and line-item crops disabled"
            );
        }
        if let Some(detector) = detector {
            strategies.push(Box::new(SniperExtractor::new(
                detector.clone(),
                ocr.clone(),
                raster.clone(),
                max_pages,
            )));
            table_crops = Some(Arc::new(SniperExtractor::new(
                detector,
                ocr.clone(),
                raster.clone(),
                max_pages,
            )));
        }
        strategies.push(Box::new(DigitalTextExtractor::new()));
        strategies.push(Box::new(FullPageOcrExtractor::new(ocr, raster, max_pages)));
        let cascade = ExtractionCascade::new(strategies);

        let recognizer: Option<Box<dyn LineItemRecognizer>> =
            match GeminiRecognizer::from_config(&config.recognizer) {
                Ok(client) => Some(Box::new(client)),
                Err(RecognizerError::MissingApiKey(var)) => {
                    log::info!(
                        "Env '{}' not set; line-item recognition disabled for this run",
                        var
                    );
                    None
                }
                Err(e) => return Err(e.into()),
            };

        Ok(Self::new(db, scanner, cascade, table_crops, recognizer, storage))
    }

    /// One full pass over the input tree and the ledger.
    pub fn run(&self) -> Result<PassSummary> {
        let _span = tracing::info_span!("pipeline.pass").entered();
        let mut summary = PassSummary::default();

        self.scan_inputs(&mut summary)?;
        self.process_pending(&mut summary)?;
        self.merge_ready_bundles(&mut summary)?;

        log::info!(
            "Pass complete: {} new, {} processed ({} ok, {} failed, {} review), {} bundles merged, {} held back",
            summary.discovered,
            summary.processed,
            summary.succeeded,
            summary.failed,
            summary.manual_review,
            summary.merged_bundles,
            summary.skipped_bundles
        );
        Ok(summary)
    }

    fn scan_inputs(&self, summary: &mut PassSummary) -> Result<()> {
        let _span = tracing::info_span!("pipeline.scan").entered();

        for found in self.scanner.scan() {
            let file_path = found.path.to_string_lossy().to_string();
            let filename = found
                .path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| file_path.clone());

            if file_repo::register(&self.db, &file_path, &filename, found.doc_type)? {
                log::info!("Registered new {} document: {}", found.doc_type, file_path);
                summary.discovered += 1;
            }
        }
        Ok(())
    }

    fn process_pending(&self, summary: &mut PassSummary) -> Result<()> {
        let _span = tracing::info_span!("pipeline.process").entered();

        for row in file_repo::pending_files(&self.db)? {
            summary.processed += 1;
            let _file_span =
                tracing::info_span!("pipeline.file", path = %row.file_path).entered();

            let Some(doc_type) = row.role() else {
                file_repo::transition(
                    &self.db,
                    &row.file_path,
                    FileStatus::Failed,
                    StatusPatch::with_error(format!("unknown document role '{}'", row.doc_type)),
                )?;
                summary.failed += 1;
                continue;
            };

            let path = Path::new(&row.file_path);
            if !path.is_file() {
                // Registered earlier, gone now. Fail it directly so it never
                // clogs the pending queue again.
                file_repo::transition(
                    &self.db,
                    &row.file_path,
                    FileStatus::Failed,
                    StatusPatch::with_error("file no longer present on disk"),
                )?;
                summary.failed += 1;
                continue;
            }

            file_repo::transition(
                &self.db,
                &row.file_path,
                FileStatus::Processing,
                StatusPatch::default(),
            )?;

            match self.cascade.resolve(path, doc_type) {
                Ok(Some(po_number)) => {
                    self.harvest_line_items(path, doc_type, &po_number);
                    file_repo::transition(
                        &self.db,
                        &row.file_path,
                        FileStatus::Success,
                        StatusPatch::with_po(po_number),
                    )?;
                    summary.succeeded += 1;
                }
                Ok(None) => {
                    file_repo::transition(
                        &self.db,
                        &row.file_path,
                        FileStatus::ManualReview,
                        StatusPatch::with_error("no purchase order identifier found"),
                    )?;
                    summary.manual_review += 1;
                }
                Err(e) => {
                    log::error!("Extraction failed for {}: {}", row.file_path, e);
                    file_repo::transition(
                        &self.db,
                        &row.file_path,
                        FileStatus::Failed,
                        StatusPatch::with_error(e.to_string()),
                    )?;
                    summary.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Runs the line-item path for one resolved document. Best-effort: this
    /// capability enriches reconciliation but never fails the file.
    fn harvest_line_items(&self, path: &Path, doc_type: DocType, po_number: &str) {
        let (Some(provider), Some(recognizer)) = (&self.table_crops, &self.recognizer) else {
            return;
        };
        let _span = tracing::info_span!("pipeline.line_items").entered();

        let crops = match provider.extract_table_crops(path) {
            Ok(crops) => crops,
            Err(e) => {
                log::warn!("Table detection failed for {}: {}", path.display(), e);
                return;
            }
        };

        for crop in &crops {
            let raw_items = match recognizer.extract_line_items(crop) {
                Ok(items) => items,
                Err(e) => {
                    log::warn!(
                        "Line-item recognition failed for a crop of {}: {}",
                        path.display(),
                        e
                    );
                    continue;
                }
            };

            let items = link_line_items(Some(po_number), doc_type, raw_items);
            if let Err(e) = item_repo::insert_batch(&self.db, &items) {
                log::warn!("Failed to persist line items for {}: {}", po_number, e);
            } else if !items.is_empty() {
                log::info!(
                    "Recorded {} line items for {} from {}",
                    items.len(),
                    po_number,
                    path.display()
                );
            }
        }
    }

    fn merge_ready_bundles(&self, summary: &mut PassSummary) -> Result<()> {
        let _span = tracing::info_span!("pipeline.merge").entered();

        for (po_number, mut files) in file_repo::success_bundles(&self.db)? {
            let _bundle_span = tracing::info_span!("pipeline.bundle", po = %po_number).entered();

            let items = item_repo::fetch_by_po(&self.db, &po_number)?;
            let report = reconcile(&po_number, &items);

            match evaluate_gate(&report) {
                MergeDecision::Skip(reason) => {
                    log::info!("Holding back {}: {}", po_number, reason);
                    summary.skipped_bundles += 1;
                    continue;
                }
                MergeDecision::ProceedWithWarning(reason) => {
                    log::warn!("Merging {} despite discrepancies: {}", po_number, reason);
                }
                MergeDecision::Proceed => {}
            }

            // Members can vanish between passes (manual cleanup); merge
            // whatever is still on disk.
            files.retain(|f| {
                let present = Path::new(&f.file_path).is_file();
                if !present {
                    log::warn!("Bundle member {} missing on disk; merging without it", f.file_path);
                }
                present
            });
            if files.is_empty() {
                log::warn!("Bundle {} has no members left on disk", po_number);
                summary.skipped_bundles += 1;
                continue;
            }

            sort_bundle(&mut files);
            if let Err(e) = self.merge_one_bundle(&po_number, &files) {
                log::error!("Failed to merge bundle {}: {}", po_number, e);
                summary.skipped_bundles += 1;
                continue;
            }
            summary.merged_bundles += 1;
        }
        Ok(())
    }

    fn merge_one_bundle(
        &self,
        po_number: &str,
        files: &[file_repo::BundleFile],
    ) -> Result<()> {
        let paths: Vec<&Path> = files.iter().map(|f| Path::new(f.file_path.as_str())).collect();
        let mut merged = merge_bundle(po_number, &paths)?;
        let saved = self.storage.save_merged(po_number, &mut merged)?;
        log::info!(
            "Merged {} documents for {} into {}",
            files.len(),
            po_number,
            saved.display()
        );

        for file in files {
            file_repo::transition(
                &self.db,
                &file.file_path,
                FileStatus::Merged,
                StatusPatch::default(),
            )?;
            // The merged output already exists; a failed archive move only
            // risks a duplicate-looking input, which re-registration ignores.
            if let Err(e) = self.storage.archive_input(Path::new(&file.file_path)) {
                log::warn!("Could not archive {}: {}", file.file_path, e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::tests_support::write_test_pdf;

    fn orchestrator(root: &Path) -> PipelineOrchestrator {
        let db = Database::open_in_memory().unwrap();
        let cascade = ExtractionCascade::new(vec![Box::new(DigitalTextExtractor::new())]);
        PipelineOrchestrator::new(
            db,
            InputScanner::new(root.join("input")),
            cascade,
            None,
            None,
            FileStorage::new(root.join("merged")),
        )
    }

    #[test]
    fn test_full_pass_merges_identifier_matched_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let po = dir.path().join("input/po/order.pdf");
        let si = dir.path().join("input/si/invoice.pdf");
        std::fs::create_dir_all(po.parent().unwrap()).unwrap();
        std::fs::create_dir_all(si.parent().unwrap()).unwrap();
        write_test_pdf(&po, "Purchase Order No: PO-2024-0117");
        write_test_pdf(&si, "Invoice against P.O. Number PO-2024-0117");

        let pipeline = orchestrator(dir.path());
        let summary = pipeline.run().unwrap();

        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.merged_bundles, 1);

        // Output written, inputs archived.
        assert!(dir.path().join("merged/PO_PO-2024-0117.pdf").exists());
        assert!(!po.exists());
        assert!(dir
            .path()
            .join("input/po/archive")
            .read_dir()
            .unwrap()
            .next()
            .is_some());
    }

    #[test]
    fn test_unresolvable_document_goes_to_manual_review() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input/po/blank.pdf");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_test_pdf(&path, "no identifier anywhere in this text");

        let pipeline = orchestrator(dir.path());
        let summary = pipeline.run().unwrap();

        assert_eq!(summary.manual_review, 1);
        assert_eq!(summary.merged_bundles, 0);
        // The file stays in place for a human.
        assert!(path.exists());
    }

    #[test]
    fn test_lone_document_merges_on_empty_report() {
        // With no line-item capability the reconciliation report is EMPTY,
        // which proceeds: identifier grouping is the only evidence there is.
        let dir = tempfile::tempdir().unwrap();
        let po = dir.path().join("input/po/order.pdf");
        std::fs::create_dir_all(po.parent().unwrap()).unwrap();
        write_test_pdf(&po, "Purchase Order No: PO-7788990");

        let pipeline = orchestrator(dir.path());
        let summary = pipeline.run().unwrap();

        assert_eq!(summary.merged_bundles, 1);
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let po = dir.path().join("input/po/order.pdf");
        std::fs::create_dir_all(po.parent().unwrap()).unwrap();
        write_test_pdf(&po, "Purchase Order No: PO-7788990");

        let pipeline = orchestrator(dir.path());
        pipeline.run().unwrap();
        let second = pipeline.run().unwrap();

        assert_eq!(second.discovered, 0);
        assert_eq!(second.processed, 0);
        assert_eq!(second.merged_bundles, 0);
    }

    #[test]
    fn test_vanished_file_fails_without_stopping_pass() {
        let dir = tempfile::tempdir().unwrap();
        let ghost = dir.path().join("input/po/ghost.pdf");
        let real = dir.path().join("input/po/real.pdf");
        std::fs::create_dir_all(ghost.parent().unwrap()).unwrap();
        std::fs::write(&ghost, b"stub").unwrap();
        write_test_pdf(&real, "Purchase Order No: PO-4455667");

        let pipeline = orchestrator(dir.path());
        // Register both, then delete one before processing by running scan
        // through a full pass after removal.
        file_repo::register(
            &pipeline.db,
            ghost.to_string_lossy().as_ref(),
            "ghost.pdf",
            DocType::Po,
        )
        .unwrap();
        std::fs::remove_file(&ghost).unwrap();

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 1);

        let row = file_repo::find_by_path(&pipeline.db, ghost.to_string_lossy().as_ref())
            .unwrap()
            .unwrap();
        assert_eq!(row.status, FileStatus::Failed);
    }

    #[test]
    fn test_garbage_pdf_is_failed_not_crashed() {
        // Digital extraction tolerates garbage (empty text), so with only
        // that strategy the file lands in manual review rather than failing.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input/po/garbage.pdf");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"definitely not a pdf").unwrap();

        let pipeline = orchestrator(dir.path());
        let summary = pipeline.run().unwrap();
        assert_eq!(summary.manual_review, 1);
    }
}
