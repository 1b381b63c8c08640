//! Pasted-text import: separator detection, row parsing and column-mapping
//! suggestion.

use crate::error::ValidationError;
use crate::models::{ColumnMapping, ColumnTarget, ImportRow, MatchField, ReferenceField};
use crate::normalize::normalize;
use std::collections::HashMap;

const DEVICE_TYPE_KEYWORDS: [&str; 3] = ["tipo", "type", "device"];
const MANUFACTURER_KEYWORDS: [&str; 3] = ["marca", "manufacturer", "mfr"];
const MODEL_KEYWORDS: [&str; 2] = ["modelo", "model"];

/// Column separator, detected once per paste from the header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Tab,
    /// Runs of two or more spaces (common for console-aligned pastes).
    MultiSpace,
    Space,
}

impl Separator {
    pub fn detect(header: &str) -> Self {
        if header.contains('\t') {
            Self::Tab
        } else if has_multi_space(header) {
            Self::MultiSpace
        } else {
            Self::Space
        }
    }

    pub fn split(&self, line: &str) -> Vec<String> {
        match self {
            Self::Tab => line.split('\t').map(|s| s.to_string()).collect(),
            Self::MultiSpace => split_multi_space(line),
            Self::Space => line.split(' ').map(|s| s.to_string()).collect(),
        }
    }
}

fn has_multi_space(line: &str) -> bool {
    let mut run = 0usize;
    for ch in line.chars() {
        if ch == ' ' {
            run += 1;
            if run >= 2 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

fn split_multi_space(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut run = 0usize;
    for ch in line.chars() {
        if ch == ' ' {
            run += 1;
            continue;
        }
        if run >= 2 {
            cells.push(current.trim().to_string());
            current.clear();
        } else {
            for _ in 0..run {
                current.push(' ');
            }
        }
        run = 0;
        current.push(ch);
    }
    cells.push(current.trim().to_string());
    // Leading separator produces an empty first cell; drop it.
    if cells.first().is_some_and(|c| c.is_empty()) && cells.len() > 1 {
        cells.remove(0);
    }
    cells
}

/// Parse pasted delimited text into rows plus a suggested column mapping.
///
/// The first non-empty line is the header. Data rows are keyed by header;
/// missing trailing cells default to empty, cells beyond the header are
/// ignored. `row_index` counts data lines only (blank lines are skipped).
pub fn parse(raw: &str) -> Result<(Vec<ImportRow>, ColumnMapping), ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyImport);
    }

    let mut lines = raw.lines().map(|l| l.trim_end_matches('\r'));
    let header_line = lines
        .by_ref()
        .find(|l| !l.trim().is_empty())
        .ok_or(ValidationError::EmptyImport)?;

    let separator = Separator::detect(header_line);
    let headers = separator.split(header_line);

    let mut rows = Vec::new();
    let mut row_index = 0usize;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let cells = separator.split(line);
        let mut map = HashMap::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            map.insert(header.clone(), cells.get(i).cloned().unwrap_or_default());
        }
        rows.push(ImportRow {
            row_index,
            cells: map,
        });
        row_index += 1;
    }

    Ok((rows, suggest_mapping(&headers)))
}

/// Keyword heuristics over normalized header names. Unrecognized columns
/// become pass-through reference fields.
pub fn suggest_mapping(headers: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    for header in headers {
        let h = normalize(header);
        let target = if DEVICE_TYPE_KEYWORDS.iter().any(|k| h.contains(k)) {
            ColumnTarget::Match(MatchField::DeviceType)
        } else if MANUFACTURER_KEYWORDS.iter().any(|k| h.contains(k)) {
            ColumnTarget::Match(MatchField::Reference(ReferenceField::Manufacturer))
        } else if MODEL_KEYWORDS.iter().any(|k| h.contains(k)) {
            ColumnTarget::Match(MatchField::Reference(ReferenceField::Model))
        } else {
            ColumnTarget::Passthrough
        };
        mapping.entries.push((header.clone(), target));
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_separated_paste() {
        let (rows, mapping) = parse("Type\tMfr\nVent\tGE\n").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].row_index, 0);
        assert_eq!(rows[0].get("Type"), "Vent");
        assert_eq!(rows[0].get("Mfr"), "GE");
        assert_eq!(
            mapping.target("Type"),
            Some(ColumnTarget::Match(MatchField::DeviceType))
        );
        assert_eq!(
            mapping.target("Mfr"),
            Some(ColumnTarget::Match(MatchField::Reference(
                ReferenceField::Manufacturer
            )))
        );
    }

    #[test]
    fn multi_space_separator_keeps_single_spaces() {
        let (rows, _) = parse("Device Type   Marca\nInfusion Pump   GE Healthcare\n").unwrap();
        assert_eq!(rows[0].get("Device Type"), "Infusion Pump");
        assert_eq!(rows[0].get("Marca"), "GE Healthcare");
    }

    #[test]
    fn single_space_fallback() {
        let (rows, mapping) = parse("Modelo Serial\nM3046A 12345\n").unwrap();
        assert_eq!(rows[0].get("Modelo"), "M3046A");
        assert_eq!(rows[0].get("Serial"), "12345");
        assert_eq!(
            mapping.target("Modelo"),
            Some(ColumnTarget::Match(MatchField::Reference(
                ReferenceField::Model
            )))
        );
        assert_eq!(mapping.target("Serial"), Some(ColumnTarget::Passthrough));
    }

    #[test]
    fn blank_lines_do_not_consume_row_indices() {
        let (rows, _) = parse("Type\tMfr\nVent\tGE\n\n\nMonitor\tPhilips\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_index, 0);
        assert_eq!(rows[1].row_index, 1);
        assert_eq!(rows[1].get("Type"), "Monitor");
    }

    #[test]
    fn missing_trailing_cells_default_to_empty() {
        let (rows, _) = parse("Type\tMfr\tModel\nVent\tGE\n").unwrap();
        assert_eq!(rows[0].get("Model"), "");
    }

    #[test]
    fn empty_paste_is_a_validation_error() {
        assert_eq!(parse("").unwrap_err(), ValidationError::EmptyImport);
        assert_eq!(parse("  \n \n").unwrap_err(), ValidationError::EmptyImport);
    }

    #[test]
    fn spanish_headers_map_by_keyword() {
        let mapping = suggest_mapping(&[
            "Tipo de Equipo".to_string(),
            "Marca".to_string(),
            "Modelo".to_string(),
            "Ubicación".to_string(),
        ]);
        assert_eq!(
            mapping.target("Tipo de Equipo"),
            Some(ColumnTarget::Match(MatchField::DeviceType))
        );
        assert_eq!(
            mapping.target("Marca"),
            Some(ColumnTarget::Match(MatchField::Reference(
                ReferenceField::Manufacturer
            )))
        );
        assert_eq!(
            mapping.target("Modelo"),
            Some(ColumnTarget::Match(MatchField::Reference(
                ReferenceField::Model
            )))
        );
        assert_eq!(mapping.target("Ubicación"), Some(ColumnTarget::Passthrough));
    }

    #[test]
    fn windows_line_endings() {
        let (rows, _) = parse("Type\tMfr\r\nVent\tGE\r\n").unwrap();
        assert_eq!(rows[0].get("Mfr"), "GE");
    }
}
