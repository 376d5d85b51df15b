//! Workbook ingestion for the vacation ledger and the employee registries.
//!
//! Sheets are read into plain rows of [`Cell`]s first; the parsers below
//! never touch calamine, so they run on in-memory rows in tests.

pub mod cells;
pub mod ledger;
pub mod registry;

use std::io::Cursor;

use anyhow::anyhow;
use calamine::{Reader, Sheets, open_workbook_auto_from_rs};
use serde::Serialize;
use utoipa::ToSchema;

pub use cells::Cell;

pub type Rows = Vec<Vec<Cell>>;

/// Header rows are searched for within this many leading rows.
const HEADER_SCAN_ROWS: usize = 15;

/// A row the importer could not take, with the 1-based sheet row number.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RowIssue {
    pub sheet: String,
    pub row: usize,
    pub employee_num: Option<String>,
    pub message: String,
}

pub struct Workbook {
    sheets: Sheets<Cursor<Vec<u8>>>,
}

impl Workbook {
    /// Opens `.xlsx`, `.xlsm`, `.xlsb` or `.xls` bytes.
    pub fn open(bytes: Vec<u8>) -> anyhow::Result<Self> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes))
            .map_err(|e| anyhow!("not a readable workbook: {e}"))?;
        Ok(Self { sheets })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet_names().iter().any(|s| s == name)
    }

    pub fn rows(&mut self, name: &str) -> anyhow::Result<Rows> {
        let range = self
            .sheets
            .worksheet_range(name)
            .map_err(|e| anyhow!("sheet {name:?}: {e}"))?;
        Ok(range
            .rows()
            .map(|row| row.iter().map(Cell::from).collect())
            .collect())
    }
}

/// Folds a header label for comparison: whitespace (full-width too) dropped,
/// ASCII lowercased and the usual "number" spellings unified.
pub(crate) fn normalize_label(label: &str) -> String {
    let folded: String = label
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    folded
        .replace("no.", "№")
        .replace("ｎｏ", "№")
        .replace("no", "№")
        .replace('#', "№")
}

/// Column positions resolved from a header row.
#[derive(Debug, Clone)]
pub(crate) struct Columns<F> {
    pub(crate) header_row: usize,
    found: Vec<(F, usize)>,
}

impl<F: Copy + PartialEq> Columns<F> {
    pub(crate) fn get(&self, field: F) -> Option<usize> {
        self.found.iter().find(|(f, _)| *f == field).map(|(_, i)| *i)
    }

    pub(crate) fn cell<'a>(&self, row: &'a [Cell], field: F) -> &'a Cell {
        const EMPTY: &Cell = &Cell::Empty;
        self.get(field).and_then(|i| row.get(i)).unwrap_or(EMPTY)
    }

    pub(crate) fn text(&self, row: &[Cell], field: F) -> Option<String> {
        self.cell(row, field).as_text()
    }
}

/// Finds the first row that names `key` plus at least one other known column.
pub(crate) fn locate_header<F: Copy + PartialEq>(
    rows: &[Vec<Cell>],
    aliases: &[(F, &[&str])],
    key: F,
) -> Option<Columns<F>> {
    let normalized: Vec<(F, Vec<String>)> = aliases
        .iter()
        .map(|(f, names)| (*f, names.iter().map(|n| normalize_label(n)).collect()))
        .collect();

    for (idx, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let mut found: Vec<(F, usize)> = Vec::new();
        for (col, cell) in row.iter().enumerate() {
            let Some(label) = cell.as_text() else { continue };
            let label = normalize_label(&label);
            if let Some((field, _)) = normalized.iter().find(|(_, names)| names.contains(&label)) {
                // first occurrence wins
                if !found.iter().any(|(f, _)| f == field) {
                    found.push((*field, col));
                }
            }
        }
        if found.iter().any(|(f, _)| *f == key) && found.len() >= 2 {
            return Some(Columns {
                header_row: idx,
                found,
            });
        }
    }
    None
}

#[cfg(test)]
pub(crate) fn text_row(cells: &[&str]) -> Vec<Cell> {
    cells
        .iter()
        .map(|s| if s.is_empty() { Cell::Empty } else { Cell::Text(s.to_string()) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum F {
        Num,
        Name,
    }

    const ALIASES: &[(F, &[&str])] = &[(F::Num, &["社員№", "社員番号"]), (F::Name, &["氏名"])];

    #[test]
    fn normalizes_number_spellings() {
        assert_eq!(normalize_label("社員 No."), normalize_label("社員№"));
        assert_eq!(normalize_label("社員　№"), "社員№");
    }

    #[test]
    fn skips_title_rows_before_the_header() {
        let rows = vec![
            text_row(&["有給休暇管理台帳", "", ""]),
            text_row(&["", "", ""]),
            text_row(&["", "社員No", "氏名"]),
            text_row(&["", "1001", "Sato"]),
        ];
        let cols = locate_header(&rows, ALIASES, F::Num).unwrap();
        assert_eq!(cols.header_row, 2);
        assert_eq!(cols.get(F::Num), Some(1));
        assert_eq!(cols.text(&rows[3], F::Name).as_deref(), Some("Sato"));
    }

    #[test]
    fn requires_the_key_column() {
        let rows = vec![text_row(&["氏名", "派遣先"])];
        assert!(locate_header(&rows, ALIASES, F::Num).is_none());
    }
}
