use serde_json::Value;

use crate::model::FlatRecord;

/// A table that will be materialised as one worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Represents all tables required to materialise the Excel workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkbookData {
    pub tables: Vec<SheetTable>,
}

/// Assembles flat records into a rectangular table.
///
/// Columns are discovered incrementally in first-seen order across the whole
/// record stream; when a record introduces a new column, every previously
/// assembled row is retroactively padded with an empty cell so the table
/// stays rectangular. A record with no value for a known column leaves the
/// cell empty. The resulting column order is processing order, which keeps
/// the output reproducible for a given input sequence.
pub fn assemble(name: impl Into<String>, records: &[FlatRecord]) -> SheetTable {
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    for record in records {
        let mut row = vec![String::new(); columns.len()];
        for (key, value) in record {
            let index = match columns.iter().position(|column| column == key) {
                Some(index) => index,
                None => {
                    columns.push(key.clone());
                    for earlier in &mut rows {
                        earlier.push(String::new());
                    }
                    row.push(String::new());
                    columns.len() - 1
                }
            };
            row[index] = cell_text(value);
        }
        rows.push(row);
    }

    SheetTable {
        name: name.into(),
        columns,
        rows,
    }
}

/// Cell rendering: strings verbatim, nulls empty, other scalars in their
/// JSON text form.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn record(value: serde_json::Value) -> FlatRecord {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn late_columns_pad_earlier_rows() {
        let records = vec![record(json!({"a": 1})), record(json!({"b": 2}))];

        let table = assemble("Sample", &records);

        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows, vec![vec!["1", ""], vec!["", "2"]]);
    }

    #[test]
    fn column_order_is_first_seen_across_the_stream() {
        let records = vec![
            record(json!({"z": "1", "m": "2"})),
            record(json!({"a": "3", "z": "4"})),
        ];

        let table = assemble("Sample", &records);

        assert_eq!(table.columns, vec!["z", "m", "a"]);
        assert_eq!(table.rows, vec![vec!["1", "2", ""], vec!["4", "", "3"]]);
    }

    #[test]
    fn every_row_matches_the_final_column_count() {
        let records = vec![
            record(json!({"a": 1})),
            record(json!({"b": 2, "c": 3})),
            record(json!({"a": 4, "d": 5})),
        ];

        let table = assemble("Sample", &records);

        for row in &table.rows {
            assert_eq!(row.len(), table.columns.len());
        }
    }

    #[test]
    fn empty_record_stream_yields_an_empty_table() {
        let table = assemble("Empty", &[]);

        assert!(table.columns.is_empty());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn scalar_values_render_in_text_form() {
        let mut flat = Map::new();
        flat.insert("count".to_string(), json!(12));
        flat.insert("ratio".to_string(), json!(0.5));
        flat.insert("enabled".to_string(), json!(true));
        flat.insert("missing".to_string(), json!(null));

        let table = assemble("Sample", &[flat]);

        assert_eq!(table.rows[0], vec!["12", "0.5", "true", ""]);
    }
}
