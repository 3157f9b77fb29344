pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod extract;
pub mod linker;
pub mod merge;
pub mod pipeline;
pub mod recognizer;
pub mod reconcile;
pub mod scanner;
pub mod storage;

pub use config::{load_config, Config, OcrConfig, RecognizerConfig};
pub use db::Database;
pub use document::{DocType, FileStatus};
pub use error::{
    ConfigError, ExtractError, MergeError, PomergeError, RecognizerError, Result, StorageError,
};
pub use extract::{
    DigitalTextExtractor, ExtractionCascade, FullPageOcrExtractor, OcrEngine, PageRasterizer,
    RegionDetector, SniperExtractor, TableCropProvider, TextExtractor,
};
pub use merge::{evaluate_gate, MergeDecision};
pub use pipeline::{PassSummary, PipelineOrchestrator};
pub use recognizer::{GeminiRecognizer, LineItemRecognizer, MockRecognizer, RawLineItem};
pub use reconcile::{reconcile, LineStatus, OverallStatus, ReconciliationReport};
pub use scanner::InputScanner;
pub use storage::FileStorage;
