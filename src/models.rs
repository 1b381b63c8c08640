use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Global catalog dimensions that are not scoped to a nomenclature system.
/// Device Type is deliberately not representable here; device-type terms live
/// inside their owning system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceField {
    Manufacturer,
    Model,
}

impl ReferenceField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manufacturer => "Manufacturer",
            Self::Model => "Model",
        }
    }

    pub const ALL: [ReferenceField; 2] = [ReferenceField::Manufacturer, ReferenceField::Model];
}

impl fmt::Display for ReferenceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A field whose values are standardized against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchField {
    DeviceType,
    Reference(ReferenceField),
}

impl MatchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceType => "Device Type",
            Self::Reference(r) => r.as_str(),
        }
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a source column maps to. `Passthrough` is the "Reference Field" choice
/// in the original mapping UI: the column is copied to the output verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnTarget {
    Match(MatchField),
    Passthrough,
    Skip,
}

impl ColumnTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match(f) => f.as_str(),
            Self::Passthrough => "Reference Field",
            Self::Skip => "",
        }
    }

    /// Parse the operator-facing label. Empty means skip.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Device Type" => Some(Self::Match(MatchField::DeviceType)),
            "Manufacturer" => Some(Self::Match(MatchField::Reference(
                ReferenceField::Manufacturer,
            ))),
            "Model" => Some(Self::Match(MatchField::Reference(ReferenceField::Model))),
            "Reference Field" => Some(Self::Passthrough),
            "" => Some(Self::Skip),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTerm {
    pub id: String,
    /// Preferred display name.
    pub standard: String,
    /// Known aliases; semantically a set, `standard` itself never appears here.
    pub variations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NomenclatureSystem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub last_updated: DateTime<Utc>,
    pub device_type_terms: Vec<CanonicalTerm>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceDb {
    pub manufacturer: Vec<CanonicalTerm>,
    pub model: Vec<CanonicalTerm>,
}

impl ReferenceDb {
    pub fn terms(&self, field: ReferenceField) -> &[CanonicalTerm] {
        match field {
            ReferenceField::Manufacturer => &self.manufacturer,
            ReferenceField::Model => &self.model,
        }
    }

    pub fn terms_mut(&mut self, field: ReferenceField) -> &mut Vec<CanonicalTerm> {
        match field {
            ReferenceField::Manufacturer => &mut self.manufacturer,
            ReferenceField::Model => &mut self.model,
        }
    }
}

/// Read-through snapshot of the persisted catalog. The engine refreshes it
/// explicitly (after review completes) rather than sharing ambient state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub nomenclature_systems: Vec<NomenclatureSystem>,
    pub reference_db: ReferenceDb,
}

impl Catalog {
    pub fn system(&self, id: &str) -> Option<&NomenclatureSystem> {
        self.nomenclature_systems.iter().find(|s| s.id == id)
    }

    pub fn system_mut(&mut self, id: &str) -> Option<&mut NomenclatureSystem> {
        self.nomenclature_systems.iter_mut().find(|s| s.id == id)
    }

    /// Term list for a match field. Device Type resolves through the active
    /// system; an unknown system id yields an empty list.
    pub fn field_terms(&self, field: MatchField, active_system: &str) -> &[CanonicalTerm] {
        match field {
            MatchField::DeviceType => self
                .system(active_system)
                .map(|s| s.device_type_terms.as_slice())
                .unwrap_or(&[]),
            MatchField::Reference(r) => self.reference_db.terms(r),
        }
    }
}

/// One parsed data line. `row_index` counts data lines only (blank lines in the
/// paste are skipped and do not consume an index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRow {
    pub row_index: usize,
    pub cells: HashMap<String, String>,
}

impl ImportRow {
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

/// Column -> target mapping, kept in header order so review-queue and output
/// column order are deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub entries: Vec<(String, ColumnTarget)>,
}

impl ColumnMapping {
    pub fn target(&self, column: &str) -> Option<ColumnTarget> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, t)| *t)
    }

    /// Override a column's target; unknown columns are appended.
    pub fn set(&mut self, column: &str, target: ColumnTarget) {
        if let Some(entry) = self.entries.iter_mut().find(|(c, _)| c == column) {
            entry.1 = target;
        } else {
            self.entries.push((column.to_string(), target));
        }
    }

    /// Columns mapped to a standardizable field, in header order.
    pub fn match_columns(&self) -> impl Iterator<Item = (&str, MatchField)> {
        self.entries.iter().filter_map(|(c, t)| match t {
            ColumnTarget::Match(f) => Some((c.as_str(), *f)),
            _ => None,
        })
    }

    pub fn has_match_column(&self) -> bool {
        self.match_columns().next().is_some()
    }
}

/// Why a candidate term was suggested. The display strings are a closed set
/// shown to the operator next to each suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchReason {
    Exact,
    ExactVariation,
    Contains,
    SimilarTerm,
    SimilarVariation,
    WordSimilarity,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "Exact match",
            Self::ExactVariation => "Exact variation match",
            Self::Contains => "Contains match",
            Self::SimilarTerm => "Similar term",
            Self::SimilarVariation => "Similar variation",
            Self::WordSimilarity => "Word similarity",
        }
    }
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub term_id: String,
    pub standard: String,
    pub score: f64,
    pub reason: MatchReason,
}

/// Terminal state of a review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewAction {
    Accepted,
    Added,
    Skipped,
    AutoMatched,
}

/// One ambiguous cell awaiting operator disambiguation. Created unprocessed,
/// mutated in place by the review session, never removed mid-session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub row_index: usize,
    pub column: String,
    pub field: MatchField,
    pub original_value: String,
    pub potential_matches: Vec<MatchCandidate>,
    pub processed: bool,
    pub action: Option<ReviewAction>,
    /// Canonical standard the value resolved to, for accepted/added/auto items.
    pub matched_term: Option<String>,
    /// Human-readable note for auto-matched items.
    pub note: Option<String>,
}

impl ReviewItem {
    pub fn new(
        row_index: usize,
        column: &str,
        field: MatchField,
        original_value: &str,
        potential_matches: Vec<MatchCandidate>,
    ) -> Self {
        Self {
            row_index,
            column: column.to_string(),
            field,
            original_value: original_value.to_string(),
            potential_matches,
            processed: false,
            action: None,
            matched_term: None,
            note: None,
        }
    }
}

/// Per-cell outcome reported in the standardized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Standardized,
    NoMatch,
    Skipped,
    AddedAsNewTerm,
    AutoMatched,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standardized => "Standardized",
            Self::NoMatch => "No Match",
            Self::Skipped => "Skipped",
            Self::AddedAsNewTerm => "Added as New Term",
            Self::AutoMatched => "Auto-Matched",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One output record: ordered (column name, value) pairs matching the export
/// header produced by `standardize::output_headers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardizedRow {
    pub cells: Vec<(String, String)>,
}

impl StandardizedRow {
    pub fn get(&self, column: &str) -> &str {
        self.cells
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }
}
