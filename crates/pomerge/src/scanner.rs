//! Input directory scanning.
//!
//! The input root carries one subdirectory per document role (`po/`, `do/`,
//! `si/`); anything else under the root is ignored. Archived files live in
//! `archive/` subdirectories and are never rescanned.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::document::DocType;

/// Directory name merged inputs are moved into after a successful merge.
pub const ARCHIVE_DIR: &str = "archive";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub doc_type: DocType,
}

pub struct InputScanner {
    input_root: PathBuf,
}

impl InputScanner {
    pub fn new(input_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
        }
    }

    /// Walks the role subdirectories and returns every PDF found, in a
    /// stable order. Missing subdirectories are normal (a site may never
    /// receive invoices) and contribute nothing.
    pub fn scan(&self) -> Vec<ScannedFile> {
        let mut found = Vec::new();

        for doc_type in [DocType::Po, DocType::Do, DocType::Si] {
            let role_dir = self.input_root.join(doc_type.as_str());
            if !role_dir.is_dir() {
                log::debug!("Input subdirectory {} absent; skipping", role_dir.display());
                continue;
            }

            for entry in WalkDir::new(&role_dir)
                .max_depth(1)
                .follow_links(false)
                .into_iter()
                .filter_entry(|e| !is_archive_dir(e.path()))
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if entry.file_type().is_file() && is_pdf(path) && !is_hidden(path) {
                    found.push(ScannedFile {
                        path: path.to_path_buf(),
                        doc_type,
                    });
                }
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        found
    }
}

fn is_archive_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(ARCHIVE_DIR))
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}
