//! Links raw recognized line items to a resolved purchase order.
//!
//! Recognition output is loosely typed and frequently incomplete; linking
//! normalizes it into ledger-ready rows without dropping anything — a row
//! with a blank reference or zero quantity still records that the document
//! carried a line there.

use crate::db::item_repo::NewLineItem;
use crate::document::DocType;
use crate::recognizer::RawLineItem;
use crate::reconcile::normalize_line_ref;

/// Converts raw recognized items into persistable rows attributed to
/// `po_number` (or left unattributed when resolution failed upstream).
pub fn link_line_items(
    po_number: Option<&str>,
    doc_type: DocType,
    raw_items: Vec<RawLineItem>,
) -> Vec<NewLineItem> {
    raw_items
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let line_ref = raw
                .line_ref
                .as_deref()
                .map(normalize_line_ref)
                .filter(|r| !r.is_empty())
                // Position is the best remaining identity when the model
                // returned no reference at all.
                .unwrap_or_else(|| (index + 1).to_string());

            NewLineItem {
                po_number: po_number.map(|p| p.to_string()),
                doc_type,
                line_ref,
                description: raw.description.unwrap_or_default().trim().to_string(),
                part_no: raw.part_no.unwrap_or_default().trim().to_string(),
                quantity: raw.quantity,
            }
        })
        .collect()
}
