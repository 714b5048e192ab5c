use std::collections::HashSet;
use std::path::Path;

use rust_xlsxwriter::Workbook;

use crate::error::Result;
use crate::table::WorkbookData;

/// Writes the provided workbook data to the given path, one sheet per table
/// in the supplied order: the header row first, then the data rows verbatim.
/// Any sheet failure aborts the whole artifact.
pub fn write_workbook(path: &Path, workbook: &WorkbookData) -> Result<()> {
    let mut workbook_writer = Workbook::new();
    let mut sheet_names = SheetNameRegistry::default();

    for table in &workbook.tables {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(&sheet_names.assign(&table.name))?;

        for (col_idx, header) in table.columns.iter().enumerate() {
            worksheet.write_string(0, col_idx as u16, header)?;
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                worksheet.write_string((row_idx + 1) as u32, col_idx as u16, cell)?;
            }
        }

        // A sheet with zero columns (empty branch result) stays a bare sheet.
        if !table.columns.is_empty() {
            let mut excel_table = rust_xlsxwriter::Table::new();
            excel_table.set_autofilter(true);

            let col_end = (table.columns.len() as u16).saturating_sub(1);
            let row_end = if table.rows.is_empty() {
                0
            } else {
                table.rows.len() as u32
            };
            worksheet.add_table(0, 0, row_end, col_end, &excel_table)?;
        }
    }

    workbook_writer.save(path)?;
    Ok(())
}

#[derive(Debug, Default)]
struct SheetNameRegistry {
    used: HashSet<String>,
}

impl SheetNameRegistry {
    fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if !self.used.contains(&base) {
            self.used.insert(base.clone());
            return base;
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let max_len = 31 - suffix.len();
            let mut prefix = base.clone();
            if prefix.len() > max_len {
                prefix.truncate(max_len);
            }
            let candidate = format!("{prefix}{suffix}");
            if !self.used.contains(&candidate) {
                self.used.insert(candidate.clone());
                return candidate;
            }
            counter += 1;
        }
    }
}

fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let mut sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    sanitized = sanitized.trim().to_string();
    if sanitized.is_empty() {
        sanitized = "Sheet".to_string();
    }

    if sanitized.len() > 31 {
        sanitized.truncate(31);
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::SheetTable;
    use tempfile::tempdir;

    #[test]
    fn sanitize_replaces_invalid_characters_and_bounds_length() {
        assert_eq!(sanitize_sheet_name("Patch/Report"), "Patch_Report");
        assert_eq!(sanitize_sheet_name("   "), "Sheet");
        assert_eq!(sanitize_sheet_name(&"x".repeat(40)).len(), 31);
    }

    #[test]
    fn registry_uniquifies_colliding_names() {
        let mut registry = SheetNameRegistry::default();

        assert_eq!(registry.assign("Report"), "Report");
        assert_eq!(registry.assign("Report"), "Report_1");
        assert_eq!(registry.assign("Report"), "Report_2");
    }

    #[test]
    fn writes_a_workbook_with_an_empty_sheet() {
        let data = WorkbookData {
            tables: vec![
                SheetTable {
                    name: "Filled".to_string(),
                    columns: vec!["a".to_string()],
                    rows: vec![vec!["1".to_string()]],
                },
                SheetTable {
                    name: "Empty".to_string(),
                    columns: Vec::new(),
                    rows: Vec::new(),
                },
            ],
        };

        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("report.xlsx");
        write_workbook(&path, &data).expect("workbook written");

        assert!(path.exists());
    }
}
