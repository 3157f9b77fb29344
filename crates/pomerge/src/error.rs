use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PomergeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to read document '{path}': {source}")]
    ReadDocument {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rasterize PDF page: {0}")]
    Rasterize(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("Region detection failed: {0}")]
    Detection(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to load PDF '{path}': {reason}")]
    LoadPdf { path: PathBuf, reason: String },

    #[error("Failed to assemble merged PDF: {0}")]
    Assemble(String),

    #[error("Bundle for {po_number} contained no pages")]
    NoPages { po_number: String },
}

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("Recognizer API key not set (env '{0}')")]
    MissingApiKey(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Recognizer returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Failed to encode crop image: {0}")]
    EncodeImage(String),

    #[error("Failed to parse recognizer response: {0}")]
    ResponseParsing(String),

    #[error("All candidate models failed")]
    AllModelsFailed,
}

pub type Result<T> = std::result::Result<T, PomergeError>;
