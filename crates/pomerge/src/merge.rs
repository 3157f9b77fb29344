//! Merge gating and PDF assembly.
//!
//! The gate is a pure decision over a reconciliation report; assembly glues
//! the bundle's PDFs into one document with lopdf, purchase order first,
//! then delivery notes, then invoices.

use std::collections::BTreeMap;
use std::path::Path;

use lopdf::{Document, Object, ObjectId};

use crate::db::file_repo::BundleFile;
use crate::document::DocType;
use crate::error::MergeError;
use crate::reconcile::{OverallStatus, ReconciliationReport};

/// Outcome of the merge gate for one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeDecision {
    Proceed,
    /// Merge anyway, but the reason belongs in the log.
    ProceedWithWarning(String),
    /// Leave the bundle in place for a later pass.
    Skip(String),
}

/// Decides whether a bundle may be merged. Pure: same report, same answer.
pub fn evaluate_gate(report: &ReconciliationReport) -> MergeDecision {
    match report.overall_status {
        OverallStatus::PoDataMissing => MergeDecision::Skip(
            "no purchase order data recorded yet".to_string(),
        ),
        OverallStatus::Incomplete => MergeDecision::Skip(
            "deliveries or invoices still incomplete".to_string(),
        ),
        // An identifier-level match with nothing actually ordered, delivered
        // or invoiced is a ghost: two documents agreeing on a number proves
        // nothing about the goods.
        OverallStatus::Match if report.has_no_effective_lines() => MergeDecision::Skip(
            "match carries no effective line items".to_string(),
        ),
        OverallStatus::Attention => MergeDecision::ProceedWithWarning(
            "over-delivered or unsolicited lines present".to_string(),
        ),
        OverallStatus::Match | OverallStatus::Empty => MergeDecision::Proceed,
    }
}

/// Orders a bundle for assembly: PO pages first, delivery notes second,
/// invoices last; path order breaks ties so reruns are byte-stable.
pub fn sort_bundle(files: &mut [BundleFile]) {
    files.sort_by(|a, b| {
        DocType::merge_priority_of(&a.doc_type)
            .cmp(&DocType::merge_priority_of(&b.doc_type))
            .then_with(|| a.file_path.cmp(&b.file_path))
    });
}

/// Assembles the bundle's PDFs into a single document.
///
/// Objects from each source are renumbered past the running maximum before
/// adoption, pages are re-parented under one page tree, and outlines are
/// dropped (they rarely survive renumbering and carry no value here).
pub fn merge_bundle(po_number: &str, paths: &[&Path]) -> Result<Document, MergeError> {
    let mut max_id = 1;
    let mut bundle_pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut bundle_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for path in paths {
        let mut doc = Document::load(path).map_err(|e| MergeError::LoadPdf {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, object_id) in doc.get_pages() {
            let page = doc
                .get_object(object_id)
                .map_err(|e| MergeError::LoadPdf {
                    path: path.to_path_buf(),
                    reason: format!("unreadable page object: {}", e),
                })?
                .clone();
            bundle_pages.insert(object_id, page);
        }
        bundle_objects.extend(doc.objects);
    }

    if bundle_pages.is_empty() {
        return Err(MergeError::NoPages {
            po_number: po_number.to_string(),
        });
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog_object: Option<(ObjectId, Object)> = None;
    let mut pages_object: Option<(ObjectId, Object)> = None;

    for (object_id, object) in bundle_objects {
        match object.type_name().unwrap_or_default() {
            b"Catalog" => {
                let id = catalog_object.map(|(id, _)| id).unwrap_or(object_id);
                catalog_object = Some((id, object));
            }
            b"Pages" => {
                if let Ok(dict) = object.as_dict() {
                    let mut dict = dict.clone();
                    if let Some((_, ref existing)) = pages_object {
                        if let Ok(existing_dict) = existing.as_dict() {
                            dict.extend(existing_dict);
                        }
                    }
                    let id = pages_object.map(|(id, _)| id).unwrap_or(object_id);
                    pages_object = Some((id, Object::Dictionary(dict)));
                }
            }
            b"Page" | b"Outlines" | b"Outline" => {}
            _ => {
                merged.objects.insert(object_id, object);
            }
        }
    }

    let (pages_id, pages) = pages_object.ok_or_else(|| {
        MergeError::Assemble("bundle carried no page tree root".to_string())
    })?;
    let (catalog_id, catalog) = catalog_object.ok_or_else(|| {
        MergeError::Assemble("bundle carried no document catalog".to_string())
    })?;

    for (object_id, object) in &bundle_pages {
        if let Ok(dict) = object.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", pages_id);
            merged.objects.insert(*object_id, Object::Dictionary(dict));
        }
    }

    if let Ok(dict) = pages.as_dict() {
        let mut dict = dict.clone();
        dict.set("Count", bundle_pages.len() as i64);
        dict.set(
            "Kids",
            bundle_pages
                .keys()
                .map(|id| Object::Reference(*id))
                .collect::<Vec<_>>(),
        );
        merged.objects.insert(pages_id, Object::Dictionary(dict));
    }

    if let Ok(dict) = catalog.as_dict() {
        let mut dict = dict.clone();
        dict.set("Pages", pages_id);
        dict.remove(b"Outlines");
        merged.objects.insert(catalog_id, Object::Dictionary(dict));
    }

    merged.trailer.set("Root", catalog_id);
    merged.max_id = merged.objects.len() as u32;
    merged.renumber_objects();
    merged.compress();
    Ok(merged)
}

#[cfg(test)]
pub(crate) mod tests_support {
    use std::path::Path;

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Writes a minimal one-page PDF carrying `text` as its text layer.
    pub fn write_test_pdf(path: &Path, text: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![50.into(), 750.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::write_test_pdf;
    use super::*;
    use crate::reconcile::{LineEntry, LineStatus};

    fn report(status: OverallStatus, lines: Vec<LineEntry>) -> ReconciliationReport {
        ReconciliationReport {
            po_number: "PO-2024-0117".to_string(),
            overall_status: status,
            lines,
        }
    }

    fn effective_line() -> LineEntry {
        LineEntry {
            line_ref: "1".to_string(),
            description: "Hex bolt M8".to_string(),
            ordered: 10.0,
            received: 10.0,
            invoiced: 10.0,
            status: LineStatus::Ok,
        }
    }

    fn ghost_line() -> LineEntry {
        LineEntry {
            line_ref: "1".to_string(),
            description: "Unknown Item".to_string(),
            ordered: 0.0,
            received: 0.0,
            invoiced: 0.0,
            status: LineStatus::Ok,
        }
    }

    #[test]
    fn test_gate_match_proceeds() {
        let decision = evaluate_gate(&report(OverallStatus::Match, vec![effective_line()]));
        assert_eq!(decision, MergeDecision::Proceed);
    }

    #[test]
    fn test_gate_empty_proceeds() {
        // No line-item capability at all still merges on identifier match.
        let decision = evaluate_gate(&report(OverallStatus::Empty, vec![]));
        assert_eq!(decision, MergeDecision::Proceed);
    }

    #[test]
    fn test_gate_incomplete_skips() {
        let decision = evaluate_gate(&report(OverallStatus::Incomplete, vec![effective_line()]));
        assert!(matches!(decision, MergeDecision::Skip(_)));
    }

    #[test]
    fn test_gate_po_data_missing_skips() {
        let decision = evaluate_gate(&report(OverallStatus::PoDataMissing, vec![]));
        assert!(matches!(decision, MergeDecision::Skip(_)));
    }

    #[test]
    fn test_gate_ghost_match_skips() {
        let decision = evaluate_gate(&report(OverallStatus::Match, vec![ghost_line()]));
        assert!(matches!(decision, MergeDecision::Skip(_)));
    }

    #[test]
    fn test_gate_attention_warns_but_proceeds() {
        let decision = evaluate_gate(&report(OverallStatus::Attention, vec![effective_line()]));
        assert!(matches!(decision, MergeDecision::ProceedWithWarning(_)));
    }

    #[test]
    fn test_sort_bundle_orders_po_do_si() {
        let mut files = vec![
            BundleFile {
                file_path: "/in/si/invoice.pdf".to_string(),
                doc_type: "si".to_string(),
            },
            BundleFile {
                file_path: "/in/po/order.pdf".to_string(),
                doc_type: "po".to_string(),
            },
            BundleFile {
                file_path: "/in/do/note_b.pdf".to_string(),
                doc_type: "do".to_string(),
            },
            BundleFile {
                file_path: "/in/do/note_a.pdf".to_string(),
                doc_type: "do".to_string(),
            },
        ];
        sort_bundle(&mut files);
        let order: Vec<&str> = files.iter().map(|f| f.file_path.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "/in/po/order.pdf",
                "/in/do/note_a.pdf",
                "/in/do/note_b.pdf",
                "/in/si/invoice.pdf",
            ]
        );
    }

    #[test]
    fn test_merge_concatenates_pages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let po = dir.path().join("po.pdf");
        let si = dir.path().join("si.pdf");
        write_test_pdf(&po, "Purchase Order PO-1");
        write_test_pdf(&si, "Invoice for PO-1");

        let merged = merge_bundle("PO-1", &[po.as_path(), si.as_path()]).unwrap();
        assert_eq!(merged.get_pages().len(), 2);

        let out = dir.path().join("merged.pdf");
        merged.clone().save(&out).unwrap();
        let reread = Document::load(&out).unwrap();
        assert_eq!(reread.get_pages().len(), 2);
    }

    #[test]
    fn test_merge_unreadable_source_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.pdf");
        std::fs::write(&bad, b"not a pdf").unwrap();

        let err = merge_bundle("PO-1", &[bad.as_path()]).unwrap_err();
        assert!(matches!(err, MergeError::LoadPdf { .. }));
    }

    #[test]
    fn test_merge_empty_bundle_is_error() {
        let err = merge_bundle("PO-1", &[]).unwrap_err();
        assert!(matches!(err, MergeError::NoPages { .. }));
    }
}
