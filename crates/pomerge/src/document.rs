//! Document roles and the per-file status state machine.

use std::fmt;

/// The three document roles tracked by the pipeline.
///
/// Every physical file belongs to exactly one role; the role decides which
/// extraction strategies apply and where the document sorts inside a merged
/// bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocType {
    /// Purchase order — the source of truth for ordered quantities.
    Po,
    /// Delivery note (always a scan in practice).
    Do,
    /// Sales invoice.
    Si,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Po => "po",
            DocType::Do => "do",
            DocType::Si => "si",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "po" => Some(DocType::Po),
            // "dn" survives in older ledgers written before the role names
            // were unified.
            "do" | "dn" => Some(DocType::Do),
            "si" => Some(DocType::Si),
            _ => None,
        }
    }

    /// Sort key inside a merged bundle: purchase order first, then delivery
    /// note, then invoice.
    pub fn merge_priority(&self) -> u8 {
        match self {
            DocType::Po => 1,
            DocType::Do => 2,
            DocType::Si => 3,
        }
    }

    /// Merge priority for a raw role string; unknown roles sort last.
    pub fn merge_priority_of(s: &str) -> u8 {
        DocType::parse(s).map(|d| d.merge_priority()).unwrap_or(99)
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a tracked file.
///
/// `Failed` and `ManualReview` are terminal for the current pipeline; the
/// `retry_count` column exists so a future reprocessing policy can reintroduce
/// them as `Pending`, but nothing increments or consults it today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Processing,
    Success,
    Failed,
    ManualReview,
    Merged,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "PENDING",
            FileStatus::Processing => "PROCESSING",
            FileStatus::Success => "SUCCESS",
            FileStatus::Failed => "FAILED",
            FileStatus::ManualReview => "MANUAL_REVIEW",
            FileStatus::Merged => "MERGED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(FileStatus::Pending),
            "PROCESSING" => Some(FileStatus::Processing),
            "SUCCESS" => Some(FileStatus::Success),
            "FAILED" => Some(FileStatus::Failed),
            "MANUAL_REVIEW" => Some(FileStatus::ManualReview),
            "MERGED" => Some(FileStatus::Merged),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Pending -> Failed` covers files that vanish from disk before
    /// processing ever starts. `Merged` is reachable only from `Success`.
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        use FileStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Failed)
                | (Processing, Success)
                | (Processing, Failed)
                | (Processing, ManualReview)
                | (Success, Merged)
        )
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
