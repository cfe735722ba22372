//! Deliverable serialization: the joined dataset as CSV and Excel, plus the
//! template-rendered "special" CSV.

use std::collections::BTreeSet;

use rust_xlsxwriter::Workbook;

use crate::error::Result;
use crate::mapping::join::JoinedRow;
use crate::template::render::Table;

/// Build the default output table from joined rows: the sorted union of all
/// row columns, missing cells empty. Deterministic for identical inputs, so
/// re-running an unchanged order reproduces the same bytes.
pub fn table_from_rows(rows: &[JoinedRow]) -> Table {
    let mut columns: BTreeSet<&str> = BTreeSet::new();
    for row in rows {
        for name in row.columns.keys() {
            columns.insert(name);
        }
    }
    let columns: Vec<String> = columns.into_iter().map(str::to_string).collect();

    let table_rows = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|name| row.columns.get(name).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    Table {
        columns,
        rows: table_rows,
    }
}

pub fn to_csv_bytes(table: &Table) -> Result<Vec<u8>> {
    if table.columns.is_empty() {
        return Ok(Vec::new());
    }
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|err| crate::error::MappingError::Format(err.to_string()))
}

pub fn to_xlsx_bytes(table: &Table) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();

    for (col, name) in table.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }
    for (row_index, row) in table.rows.iter().enumerate() {
        for (col, value) in row.iter().enumerate() {
            worksheet.write_string(row_index as u32 + 1, col as u16, value)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(fields: &[(&str, &str)]) -> JoinedRow {
        JoinedRow {
            columns: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            matched: true,
        }
    }

    #[test]
    fn table_covers_the_union_of_columns() {
        let rows = [
            joined(&[("acct", "1"), ("name", "A")]),
            joined(&[("acct", "2"), ("balance", "9.50")]),
        ];
        let table = table_from_rows(&rows);
        assert_eq!(table.columns, vec!["acct", "balance", "name"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["1".to_string(), String::new(), "A".to_string()],
                vec!["2".to_string(), "9.50".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn csv_output_is_deterministic() {
        let rows = [joined(&[("b", "2"), ("a", "1")])];
        let table = table_from_rows(&rows);
        let first = to_csv_bytes(&table).expect("csv");
        let second = to_csv_bytes(&table).expect("csv");
        assert_eq!(first, second);
        assert_eq!(String::from_utf8(first).expect("utf8"), "a,b\n1,2\n");
    }

    #[test]
    fn xlsx_output_has_content() {
        let rows = [joined(&[("a", "1")])];
        let table = table_from_rows(&rows);
        let bytes = to_xlsx_bytes(&table).expect("xlsx");
        // XLSX files are zip archives.
        assert_eq!(&bytes[..2], b"PK");
    }
}
