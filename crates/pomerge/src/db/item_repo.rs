//! Line-item repository — the append-only `line_items` half of the ledger.
//!
//! Rows are created by the linker after a successful extraction and never
//! mutated. Duplicate rows are legal (repeated recognition passes); the
//! reconciliation engine sums over whatever is here.

use chrono::Utc;
use rusqlite::{params, Row};

use super::{Database, DatabaseError};
use crate::document::DocType;

/// A line item ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLineItem {
    pub po_number: Option<String>,
    pub doc_type: DocType,
    pub line_ref: String,
    pub description: String,
    pub part_no: String,
    pub quantity: f64,
}

/// A stored line item.
#[derive(Debug, Clone)]
pub struct LineItemRow {
    pub po_number: Option<String>,
    pub doc_type: String,
    pub line_ref: String,
    pub description: String,
    pub part_no: String,
    pub quantity: f64,
    pub created_at: String,
}

impl LineItemRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            po_number: row.get("po_number")?,
            doc_type: row.get("doc_type")?,
            line_ref: row.get::<_, Option<String>>("line_ref")?.unwrap_or_default(),
            description: row
                .get::<_, Option<String>>("description")?
                .unwrap_or_default(),
            part_no: row.get::<_, Option<String>>("part_no")?.unwrap_or_default(),
            quantity: row.get("quantity")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Batch-inserts extracted line items. An empty batch is a no-op.
pub fn insert_batch(db: &Database, items: &[NewLineItem]) -> Result<(), DatabaseError> {
    if items.is_empty() {
        return Ok(());
    }

    db.with_conn(|conn| {
        let now = Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            "INSERT INTO line_items (po_number, doc_type, line_ref, description, part_no, quantity, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for item in items {
            stmt.execute(params![
                item.po_number,
                item.doc_type.as_str(),
                item.line_ref,
                item.description,
                item.part_no,
                item.quantity,
                now
            ])?;
        }
        Ok(())
    })
}

/// Returns every line item linked to a PO number, in insertion order.
pub fn fetch_by_po(db: &Database, po_number: &str) -> Result<Vec<LineItemRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM line_items WHERE po_number = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![po_number], LineItemRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
