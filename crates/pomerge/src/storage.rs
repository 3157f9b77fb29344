//! Output and archive filesystem handling.
//!
//! Merged bundles land in the output directory as `PO_<number>.pdf`;
//! consumed inputs are moved into an `archive/` subdirectory next to where
//! they were found, date-prefixed. Neither operation ever overwrites an
//! existing file.

use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::scanner::ARCHIVE_DIR;

pub struct FileStorage {
    output_dir: PathBuf,
}

impl FileStorage {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes a merged document to the output directory and returns the
    /// path it was saved under.
    pub fn save_merged(
        &self,
        po_number: &str,
        document: &mut lopdf::Document,
    ) -> Result<PathBuf, StorageError> {
        ensure_dir(&self.output_dir)?;

        let stem = format!("PO_{}", sanitize_component(po_number));
        let target = next_free_path(&self.output_dir, &stem, "pdf");

        let mut bytes = Vec::new();
        document
            .save_to(&mut bytes)
            .map_err(|e| StorageError::WriteFile {
                path: target.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;
        std::fs::write(&target, bytes).map_err(|e| StorageError::WriteFile {
            path: target.clone(),
            source: e,
        })?;

        log::info!("Saved merged bundle to {}", target.display());
        Ok(target)
    }

    /// Moves a consumed input into the `archive/` subdirectory beside it,
    /// prefixed with today's date.
    pub fn archive_input(&self, source: &Path) -> Result<PathBuf, StorageError> {
        let parent = source.parent().unwrap_or_else(|| Path::new("."));
        let archive_dir = parent.join(ARCHIVE_DIR);
        ensure_dir(&archive_dir)?;

        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf");
        let dated = format!("{}_{}", chrono::Local::now().format("%Y%m%d"), filename);

        let stem = Path::new(&dated)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&dated)
            .to_string();
        let ext = Path::new(&dated)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("pdf")
            .to_string();
        let target = next_free_path(&archive_dir, &stem, &ext);

        std::fs::rename(source, &target).map_err(|e| StorageError::MoveFile {
            from: source.to_path_buf(),
            to: target.clone(),
            source: e,
        })?;

        log::debug!("Archived {} as {}", source.display(), target.display());
        Ok(target)
    }
}

fn ensure_dir(path: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Replaces anything outside `[A-Za-z0-9._-]` so the identifier is safe as
/// a filename component.
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// First non-colliding `<stem>.<ext>`, `<stem>_2.<ext>`, `<stem>_3.<ext>`…
fn next_free_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, ext));
    if !candidate.exists() {
        return candidate;
    }
    let mut counter = 2u32;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", stem, counter, ext));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
