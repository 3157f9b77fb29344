//! Three-way reconciliation of ordered vs. delivered vs. invoiced quantities.
//!
//! Pure and deterministic: given the same line items in any insertion order,
//! the engine produces an identical report. All grouping uses `BTreeMap` so
//! the per-line output order is stable.

use std::collections::BTreeMap;

use crate::db::item_repo::LineItemRow;
use crate::document::DocType;

/// Verdict for one purchase-order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// Delivered quantity equals ordered quantity.
    Ok,
    /// Delivered less than ordered.
    PartialDelivery,
    /// Delivered more than ordered.
    OverDelivery,
    /// Delivered line with no counterpart in the purchase order.
    Unsolicited,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineStatus::Ok => "OK",
            LineStatus::PartialDelivery => "PARTIAL_DELIVERY",
            LineStatus::OverDelivery => "OVER_DELIVERY",
            LineStatus::Unsolicited => "UNSOLICITED",
        }
    }
}

/// Verdict for a whole PO universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    /// Every PO line fully delivered, nothing unsolicited.
    Match,
    /// At least one line under-delivered. Outranks everything else.
    Incomplete,
    /// Over-delivery or unsolicited lines; mergeable with a warning.
    Attention,
    /// No line items exist for this PO at all.
    Empty,
    /// Delivery/invoice items exist but the PO side was never extracted;
    /// comparing against an empty source of truth is meaningless.
    PoDataMissing,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Match => "MATCH",
            OverallStatus::Incomplete => "INCOMPLETE",
            OverallStatus::Attention => "ATTENTION",
            OverallStatus::Empty => "EMPTY",
            OverallStatus::PoDataMissing => "PO_DATA_MISSING",
        }
    }

    /// Escalates, never downgrades: INCOMPLETE > ATTENTION > MATCH.
    fn escalate(self, next: OverallStatus) -> OverallStatus {
        match (self, next) {
            (OverallStatus::Incomplete, _) => OverallStatus::Incomplete,
            (_, OverallStatus::Incomplete) => OverallStatus::Incomplete,
            (OverallStatus::Attention, _) => OverallStatus::Attention,
            (_, next) => next,
        }
    }
}

/// One comparison line in the report.
#[derive(Debug, Clone, PartialEq)]
pub struct LineEntry {
    pub line_ref: String,
    pub description: String,
    pub ordered: f64,
    pub received: f64,
    pub invoiced: f64,
    pub status: LineStatus,
}

impl LineEntry {
    /// A line carries evidence only if some side saw a nonzero quantity.
    pub fn is_effective(&self) -> bool {
        self.ordered > 0.0 || self.received > 0.0 || self.invoiced > 0.0
    }
}

/// The derived (never persisted) reconciliation result for one PO.
#[derive(Debug, Clone)]
pub struct ReconciliationReport {
    pub po_number: String,
    pub overall_status: OverallStatus,
    pub lines: Vec<LineEntry>,
}

impl ReconciliationReport {
    /// True when the report has no line with any nonzero quantity — the
    /// "ghost match" precondition.
    pub fn has_no_effective_lines(&self) -> bool {
        !self.lines.iter().any(LineEntry::is_effective)
    }
}

/// Normalizes a line reference: trims whitespace and strips a trailing `.0`
/// (numeric refs frequently come back as floats from recognition).
pub fn normalize_line_ref(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_suffix(".0").unwrap_or(trimmed).to_string()
}

#[derive(Debug, Clone)]
struct PoLine {
    quantity: f64,
    description: String,
}

/// Performs the three-way match for one PO universe.
pub fn reconcile(po_number: &str, items: &[LineItemRow]) -> ReconciliationReport {
    if items.is_empty() {
        return ReconciliationReport {
            po_number: po_number.to_string(),
            overall_status: OverallStatus::Empty,
            lines: Vec::new(),
        };
    }

    // Bucketize by role. The PO ledger is last-write-wins (POs are expected
    // to have unique refs); delivery and invoice quantities sum across
    // documents, so a delivery split over two notes adds up.
    let mut po_ledger: BTreeMap<String, PoLine> = BTreeMap::new();
    let mut dn_ledger: BTreeMap<String, f64> = BTreeMap::new();
    let mut si_ledger: BTreeMap<String, f64> = BTreeMap::new();

    for item in items {
        let line_ref = normalize_line_ref(&item.line_ref);
        match DocType::parse(&item.doc_type) {
            Some(DocType::Po) => {
                po_ledger.insert(
                    line_ref,
                    PoLine {
                        quantity: item.quantity,
                        description: if item.description.is_empty() {
                            "Unknown Item".to_string()
                        } else {
                            item.description.clone()
                        },
                    },
                );
            }
            Some(DocType::Do) => {
                *dn_ledger.entry(line_ref).or_insert(0.0) += item.quantity;
            }
            Some(DocType::Si) => {
                *si_ledger.entry(line_ref).or_insert(0.0) += item.quantity;
            }
            None => {
                log::warn!(
                    "Ignoring line item with unknown doc_type '{}' for {}",
                    item.doc_type,
                    po_number
                );
            }
        }
    }

    // Circuit breaker: delivery or invoice evidence without any PO lines
    // means the source of truth was never extracted. Reporting a match here
    // would be a false positive.
    if po_ledger.is_empty() && (!dn_ledger.is_empty() || !si_ledger.is_empty()) {
        return ReconciliationReport {
            po_number: po_number.to_string(),
            overall_status: OverallStatus::PoDataMissing,
            lines: Vec::new(),
        };
    }

    let mut lines = Vec::new();
    let mut overall = OverallStatus::Match;

    // Compare what was ordered against what arrived.
    for (line_ref, po_line) in &po_ledger {
        let ordered = po_line.quantity;
        let received = dn_ledger.get(line_ref).copied().unwrap_or(0.0);
        let invoiced = si_ledger.get(line_ref).copied().unwrap_or(0.0);

        let status = if received < ordered {
            overall = overall.escalate(OverallStatus::Incomplete);
            LineStatus::PartialDelivery
        } else if received > ordered {
            overall = overall.escalate(OverallStatus::Attention);
            LineStatus::OverDelivery
        } else {
            LineStatus::Ok
        };

        lines.push(LineEntry {
            line_ref: line_ref.clone(),
            description: po_line.description.clone(),
            ordered,
            received,
            invoiced,
            status,
        });
    }

    // Orphan deliveries: received but never ordered.
    for (line_ref, &received) in &dn_ledger {
        if po_ledger.contains_key(line_ref) {
            continue;
        }
        overall = overall.escalate(OverallStatus::Attention);
        lines.push(LineEntry {
            line_ref: line_ref.clone(),
            description: "UNKNOWN ITEM (not in PO)".to_string(),
            ordered: 0.0,
            received,
            invoiced: si_ledger.get(line_ref).copied().unwrap_or(0.0),
            status: LineStatus::Unsolicited,
        });
    }

    ReconciliationReport {
        po_number: po_number.to_string(),
        overall_status: overall,
        lines,
    }
}
