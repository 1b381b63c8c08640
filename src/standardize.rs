//! Final standardization pass over an import.
//!
//! Each mapped column expands into an Original / Standardized / Status triple;
//! pass-through columns are copied verbatim under their original name. Values
//! are re-resolved against the post-review catalog rather than replayed from
//! review decisions, so terms created or merged late in the session apply to
//! rows reviewed earlier. The review actions only decide the Status label.

use crate::models::{
    Catalog, ColumnMapping, ColumnTarget, ImportRow, MatchField, ReviewAction, ReviewItem,
    StandardizedRow, Status,
};
use crate::normalize::normalize;

/// Export header, in mapping order. Skipped columns are dropped entirely.
pub fn output_headers(mapping: &ColumnMapping) -> Vec<String> {
    let mut headers = Vec::new();
    for (column, target) in &mapping.entries {
        match target {
            ColumnTarget::Match(_) => {
                headers.push(format!("Original {column}"));
                headers.push(format!("Standardized {column}"));
                headers.push(format!("Status {column}"));
            }
            ColumnTarget::Passthrough => headers.push(column.clone()),
            ColumnTarget::Skip => {}
        }
    }
    headers
}

pub fn standardize(
    rows: &[ImportRow],
    mapping: &ColumnMapping,
    catalog: &Catalog,
    active_system: &str,
    review_items: &[ReviewItem],
) -> Vec<StandardizedRow> {
    rows.iter()
        .map(|row| standardize_row(row, mapping, catalog, active_system, review_items))
        .collect()
}

fn standardize_row(
    row: &ImportRow,
    mapping: &ColumnMapping,
    catalog: &Catalog,
    active_system: &str,
    review_items: &[ReviewItem],
) -> StandardizedRow {
    let mut cells = Vec::new();
    for (column, target) in &mapping.entries {
        let value = row.get(column);
        match target {
            ColumnTarget::Passthrough => {
                cells.push((column.clone(), value.to_string()));
            }
            ColumnTarget::Skip => {}
            ColumnTarget::Match(field) => {
                let (standardized, status) = if value.trim().is_empty() {
                    (String::new(), None)
                } else {
                    let (standardized, status) =
                        resolve(value, *field, catalog, active_system, review_items);
                    (standardized, Some(status))
                };
                cells.push((format!("Original {column}"), value.to_string()));
                cells.push((format!("Standardized {column}"), standardized));
                cells.push((
                    format!("Status {column}"),
                    status.map(|s| s.to_string()).unwrap_or_default(),
                ));
            }
        }
    }
    StandardizedRow { cells }
}

fn resolve(
    value: &str,
    field: MatchField,
    catalog: &Catalog,
    active_system: &str,
    review_items: &[ReviewItem],
) -> (String, Status) {
    let matched = exact_term(value, field, catalog, active_system);
    let standardized = matched.clone().unwrap_or_else(|| value.to_string());

    let status = review_status(value, field, review_items).unwrap_or(if matched.is_some() {
        Status::Standardized
    } else {
        Status::NoMatch
    });
    (standardized, status)
}

/// Exact normalized standard-or-variation lookup against the current catalog.
/// A plain equality scan, not the matcher: its minimum-length floor must not
/// apply here.
fn exact_term(
    value: &str,
    field: MatchField,
    catalog: &Catalog,
    active_system: &str,
) -> Option<String> {
    let needle = normalize(value);
    catalog
        .field_terms(field, active_system)
        .iter()
        .find(|t| {
            normalize(&t.standard) == needle || t.variations.iter().any(|v| normalize(v) == needle)
        })
        .map(|t| t.standard.clone())
}

/// Status from review actions for this exact `(field, original value)` pair.
/// A skip anywhere in the session outranks any other decision for the value.
fn review_status(value: &str, field: MatchField, review_items: &[ReviewItem]) -> Option<Status> {
    let actions: Vec<ReviewAction> = review_items
        .iter()
        .filter(|i| i.field == field && i.original_value == value)
        .filter_map(|i| i.action)
        .collect();
    if actions.is_empty() {
        return None;
    }
    if actions.contains(&ReviewAction::Skipped) {
        Some(Status::Skipped)
    } else if actions.contains(&ReviewAction::Added) {
        Some(Status::AddedAsNewTerm)
    } else if actions.contains(&ReviewAction::Accepted) {
        Some(Status::Standardized)
    } else if actions.contains(&ReviewAction::AutoMatched) {
        Some(Status::AutoMatched)
    } else {
        None
    }
}
