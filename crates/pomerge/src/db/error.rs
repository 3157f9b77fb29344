use std::path::PathBuf;
use thiserror::Error;

use crate::document::FileStatus;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Unknown file: {0}")]
    UnknownFile(String),

    #[error("Corrupt status value '{value}' for file '{file_path}'")]
    CorruptStatus { file_path: String, value: String },

    #[error("Illegal status transition {from} -> {to} for '{file_path}'")]
    IllegalTransition {
        file_path: String,
        from: FileStatus,
        to: FileStatus,
    },
}
