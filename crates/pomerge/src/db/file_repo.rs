//! File repository — the `files` half of the ledger.
//!
//! One row per tracked physical document. Rows are created at scan time and
//! never deleted; status changes go through [`transition`], which enforces
//! the state machine and applies merge-patch semantics (a write that carries
//! no new PO number must not null out an existing one).

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::document::{DocType, FileStatus};

/// A raw file row from the ledger.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub file_path: String,
    pub filename: String,
    pub doc_type: String,
    pub status: FileStatus,
    pub po_number: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl FileRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let file_path: String = row.get("file_path")?;
        let raw_status: String = row.get("status")?;
        let status = FileStatus::parse(&raw_status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("invalid status '{}' for '{}'", raw_status, file_path).into(),
            )
        })?;
        Ok(Self {
            file_path,
            filename: row.get("filename")?,
            doc_type: row.get("doc_type")?,
            status,
            po_number: row.get("po_number")?,
            error_message: row.get("error_message")?,
            retry_count: row.get("retry_count")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Parsed document role, if the stored value is recognized.
    pub fn role(&self) -> Option<DocType> {
        DocType::parse(&self.doc_type)
    }
}

/// One member of a mergeable bundle.
#[derive(Debug, Clone)]
pub struct BundleFile {
    pub file_path: String,
    pub doc_type: String,
}

/// Fields a transition may carry alongside the new status.
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    /// Written only when `Some`; an existing PO number is preserved
    /// otherwise (`COALESCE` in the update).
    pub po_number: Option<String>,
    /// Always written, including `None` — a successful transition clears
    /// any stale diagnostic.
    pub error_message: Option<String>,
}

impl StatusPatch {
    pub fn with_po(po_number: impl Into<String>) -> Self {
        Self {
            po_number: Some(po_number.into()),
            error_message: None,
        }
    }

    pub fn with_error(message: impl Into<String>) -> Self {
        Self {
            po_number: None,
            error_message: Some(message.into()),
        }
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Registers a newly discovered file as PENDING.
///
/// Returns `false` when the path is already tracked — re-registration is a
/// no-op, never an update.
pub fn register(
    db: &Database,
    file_path: &str,
    filename: &str,
    doc_type: DocType,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let now = now_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO files (file_path, filename, doc_type, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                file_path,
                filename,
                doc_type.as_str(),
                FileStatus::Pending.as_str(),
                now
            ],
        )?;
        Ok(inserted > 0)
    })
}

/// Finds a file by its path.
pub fn find_by_path(db: &Database, file_path: &str) -> Result<Option<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM files WHERE file_path = ?1",
                params![file_path],
                FileRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Fetches the next batch of work: every PENDING file, oldest first.
pub fn pending_files(db: &Database) -> Result<Vec<FileRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM files WHERE status = ?1 ORDER BY created_at, file_path",
        )?;
        let rows = stmt
            .query_map(params![FileStatus::Pending.as_str()], FileRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Moves a file to a new status, enforcing the state machine.
///
/// The read-validate-write runs under the single connection lock, so no other
/// in-process writer can interleave. An illegal transition errors and leaves
/// the row untouched.
pub fn transition(
    db: &Database,
    file_path: &str,
    to: FileStatus,
    patch: StatusPatch,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        let raw: Option<String> = conn
            .query_row(
                "SELECT status FROM files WHERE file_path = ?1",
                params![file_path],
                |r| r.get(0),
            )
            .optional()?;

        let raw = raw.ok_or_else(|| DatabaseError::UnknownFile(file_path.to_string()))?;
        let from = FileStatus::parse(&raw).ok_or_else(|| DatabaseError::CorruptStatus {
            file_path: file_path.to_string(),
            value: raw.clone(),
        })?;

        if !from.can_transition_to(to) {
            return Err(DatabaseError::IllegalTransition {
                file_path: file_path.to_string(),
                from,
                to,
            });
        }

        conn.execute(
            "UPDATE files
             SET status = ?2,
                 po_number = COALESCE(?3, po_number),
                 error_message = ?4,
                 updated_at = ?5
             WHERE file_path = ?1",
            params![
                file_path,
                to.as_str(),
                patch.po_number,
                patch.error_message,
                now_rfc3339()
            ],
        )?;
        Ok(())
    })
}

/// Groups every SUCCESS file with a resolved PO number into bundles.
///
/// BTreeMap keeps bundle iteration deterministic across passes.
pub fn success_bundles(db: &Database) -> Result<BTreeMap<String, Vec<BundleFile>>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT po_number, file_path, doc_type FROM files
             WHERE status = ?1 AND po_number IS NOT NULL
             ORDER BY po_number, file_path",
        )?;
        let rows = stmt.query_map(params![FileStatus::Success.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                BundleFile {
                    file_path: row.get(1)?,
                    doc_type: row.get(2)?,
                },
            ))
        })?;

        let mut bundles: BTreeMap<String, Vec<BundleFile>> = BTreeMap::new();
        for row in rows {
            let (po_number, file) = row?;
            bundles.entry(po_number).or_default().push(file);
        }
        Ok(bundles)
    })
}

/// Counts files with the given status.
pub fn count_by_status(db: &Database, status: FileStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM files WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
