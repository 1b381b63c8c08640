//! Tab-delimited export of standardized rows. The same format the paste-in
//! import accepts, so output round-trips through a spreadsheet.

use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use std::fs::File;
use std::io::BufWriter;

use crate::models::{ColumnMapping, StandardizedRow};
use crate::standardize::output_headers;

/// Render rows to tab-joined text (header line first), for clipboard use.
pub fn render(mapping: &ColumnMapping, rows: &[StandardizedRow]) -> Result<String> {
    let mut w = WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new());
    write_all(&mut w, mapping, rows)?;
    let bytes = w.into_inner().context("flushing export buffer")?;
    String::from_utf8(bytes).context("export output was not valid UTF-8")
}

pub fn export_to_file(path: &str, mapping: &ColumnMapping, rows: &[StandardizedRow]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {path}"))?;
    let buf = BufWriter::with_capacity(64 * 1024, file);
    let mut w = WriterBuilder::new().delimiter(b'\t').from_writer(buf);
    write_all(&mut w, mapping, rows)?;
    w.flush()?;
    Ok(())
}

fn write_all<W: std::io::Write>(
    w: &mut Writer<W>,
    mapping: &ColumnMapping,
    rows: &[StandardizedRow],
) -> Result<()> {
    let headers = output_headers(mapping);
    w.write_record(&headers)?;
    for row in rows {
        let record: Vec<&str> = headers.iter().map(|h| row.get(h)).collect();
        w.write_record(&record)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnTarget, MatchField};

    fn fixture() -> (ColumnMapping, Vec<StandardizedRow>) {
        let mut mapping = ColumnMapping::default();
        mapping.set("Type", ColumnTarget::Match(MatchField::DeviceType));
        mapping.set("Serial", ColumnTarget::Passthrough);
        let rows = vec![StandardizedRow {
            cells: vec![
                ("Original Type".into(), "Ventilador".into()),
                ("Standardized Type".into(), "Ventilator".into()),
                ("Status Type".into(), "Standardized".into()),
                ("Serial".into(), "SN1".into()),
            ],
        }];
        (mapping, rows)
    }

    #[test]
    fn renders_tab_joined_lines() {
        let (mapping, rows) = fixture();
        let text = render(&mapping, &rows).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Original Type\tStandardized Type\tStatus Type\tSerial"
        );
        assert_eq!(
            lines.next().unwrap(),
            "Ventilador\tVentilator\tStandardized\tSN1"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn missing_cells_render_empty() {
        let (mapping, _) = fixture();
        let rows = vec![StandardizedRow { cells: vec![] }];
        let text = render(&mapping, &rows).unwrap();
        assert_eq!(text.lines().nth(1).unwrap(), "\t\t\t");
    }
}
