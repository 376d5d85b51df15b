//! Vacation ledger sheet (`作業者データ　有給`): one row per employee and grant year.

use std::collections::HashSet;

use anyhow::bail;
use chrono::NaiveDate;

use super::{Cell, Columns, RowIssue, locate_header};
use crate::fiscal::{
    balance::DAY_EPSILON,
    calendar::fiscal_year_of,
};

pub const DEFAULT_SHEET: &str = "作業者データ　有給";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    EmployeeNum,
    Name,
    Haken,
    HireDate,
    GrantDate,
    Year,
    Granted,
    Used,
    Balance,
    Expired,
    CarriedOver,
    UsageDates,
}

const ALIASES: &[(Field, &[&str])] = &[
    (Field::EmployeeNum, &["社員№", "社員番号", "従業員番号", "employee_num"]),
    (Field::Name, &["氏名", "名前", "name"]),
    (Field::Haken, &["派遣先", "所属", "haken"]),
    (Field::HireDate, &["入社日", "hire_date"]),
    (Field::GrantDate, &["有給発生", "付与日", "発生日", "grant_date"]),
    (Field::Year, &["年度", "year"]),
    (Field::Granted, &["付与数", "付与日数", "granted"]),
    (Field::Used, &["消化日数", "使用日数", "used"]),
    (Field::Balance, &["期末残高", "残日数", "balance"]),
    (Field::Expired, &["時効数", "expired"]),
    (Field::CarriedOver, &["前年度繰越", "繰越", "carried_over"]),
    (Field::UsageDates, &["取得日", "使用日"]),
];

/// One normalized ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    /// 1-based row number in the sheet.
    pub row: usize,
    pub employee_num: String,
    pub name: String,
    pub haken: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub grant_date: Option<NaiveDate>,
    pub year: i32,
    pub granted: f64,
    pub used: f64,
    pub expired: f64,
    pub carried_over: f64,
    /// Leave days listed after the `取得日` column.
    pub usage: Vec<(NaiveDate, f64)>,
}

#[derive(Debug, Default)]
pub struct LedgerSheet {
    pub records: Vec<LedgerRecord>,
    pub issues: Vec<RowIssue>,
}

/// Usage cell, with `半` marking a half day ("2025/05/01半", "2025/05/01(半)").
fn usage_entry(cell: &Cell) -> Option<(NaiveDate, f64)> {
    match cell {
        Cell::Text(s) if s.contains('半') => {
            let stripped: String = s
                .chars()
                .filter(|c| !matches!(c, '半' | '(' | ')' | '（' | '）'))
                .collect();
            Cell::Text(stripped).as_date().map(|d| (d, 0.5))
        }
        other => other.as_date().map(|d| (d, 1.0)),
    }
}

fn year_from(cell: &Cell) -> Option<i32> {
    let n = match cell {
        Cell::Text(s) => s.trim().trim_end_matches("年度").parse::<f64>().ok(),
        other => other.as_f64(),
    }?;
    (n.fract() == 0.0 && (1900.0..=2999.0).contains(&n)).then_some(n as i32)
}

struct RowContext<'a> {
    sheet: &'a str,
    row: usize,
    employee_num: Option<String>,
}

impl RowContext<'_> {
    fn issue(&self, message: impl Into<String>) -> RowIssue {
        RowIssue {
            sheet: self.sheet.to_string(),
            row: self.row,
            employee_num: self.employee_num.clone(),
            message: message.into(),
        }
    }
}

fn day_count(cols: &Columns<Field>, row: &[Cell], field: Field, label: &str) -> Result<Option<f64>, String> {
    let cell = cols.cell(row, field);
    if cell.is_empty() {
        return Ok(None);
    }
    match cell.as_f64() {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
        Some(v) => Err(format!("{label} must be a non-negative number, got {v}")),
        None => Err(format!("{label} is not a number: {cell:?}")),
    }
}

fn parse_row(
    cols: &Columns<Field>,
    usage_cols: &[usize],
    row: &[Cell],
    ctx: &RowContext<'_>,
    start_month: u32,
) -> Result<LedgerRecord, String> {
    let employee_num = ctx.employee_num.clone().ok_or("missing employee number")?;
    let name = cols.text(row, Field::Name).ok_or("missing name")?;

    let hire_date = cols.cell(row, Field::HireDate).as_date();
    let grant_date = cols.cell(row, Field::GrantDate).as_date();
    let year = year_from(cols.cell(row, Field::Year))
        .or_else(|| grant_date.map(|d| fiscal_year_of(d, start_month)))
        .ok_or("no fiscal year: neither 年度 nor a grant date is present")?;

    let usage: Vec<(NaiveDate, f64)> = usage_cols
        .iter()
        .filter_map(|i| row.get(*i))
        .filter_map(usage_entry)
        .collect();

    let granted = day_count(cols, row, Field::Granted, "granted")?.unwrap_or(0.0);
    let used = match day_count(cols, row, Field::Used, "used")? {
        Some(v) => v,
        None => usage.iter().map(|(_, d)| d).sum(),
    };
    let expired = match day_count(cols, row, Field::Expired, "expired")? {
        Some(v) => v,
        // derive lapsed days from the closing balance when the ledger only gives that
        None => match day_count(cols, row, Field::Balance, "balance")? {
            Some(balance) => (granted - used - balance).max(0.0),
            None => 0.0,
        },
    };
    let carried_over = day_count(cols, row, Field::CarriedOver, "carried over")?.unwrap_or(0.0);

    if used + expired > granted + DAY_EPSILON {
        return Err(format!(
            "used ({used}) plus expired ({expired}) exceeds granted ({granted})"
        ));
    }

    Ok(LedgerRecord {
        row: ctx.row,
        employee_num,
        name,
        haken: cols.text(row, Field::Haken),
        hire_date,
        grant_date,
        year,
        granted,
        used,
        expired,
        carried_over,
        usage,
    })
}

/// Normalizes a ledger sheet. Rows that cannot be taken are reported, never fatal;
/// only a sheet without a recognizable header fails.
pub fn parse(sheet: &str, rows: &[Vec<Cell>], start_month: u32) -> anyhow::Result<LedgerSheet> {
    let Some(cols) = locate_header(rows, ALIASES, Field::EmployeeNum) else {
        bail!("sheet {sheet:?} has no header row with a 社員№ column");
    };

    // the usage block runs from 取得日 to the end of the row, minus named columns
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let usage_cols: Vec<usize> = match cols.get(Field::UsageDates) {
        Some(first) => (first..width)
            .filter(|i| *i == first || !ALIASES.iter().any(|(f, _)| cols.get(*f) == Some(*i)))
            .collect(),
        None => Vec::new(),
    };

    let mut out = LedgerSheet::default();
    let mut seen = HashSet::new();
    for (idx, row) in rows.iter().enumerate().skip(cols.header_row + 1) {
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        let ctx = RowContext {
            sheet,
            row: idx + 1,
            employee_num: cols.text(row, Field::EmployeeNum),
        };
        match parse_row(&cols, &usage_cols, row, &ctx, start_month) {
            Ok(rec) => {
                if seen.insert((rec.employee_num.clone(), rec.year)) {
                    out.records.push(rec);
                } else {
                    out.issues.push(ctx.issue(format!(
                        "duplicate row for fiscal year {}, first occurrence kept",
                        rec.year
                    )));
                }
            }
            Err(msg) => out.issues.push(ctx.issue(msg)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::text_row;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn header() -> Vec<Cell> {
        text_row(&[
            "社員№", "氏名", "派遣先", "入社日", "有給発生", "付与数", "消化日数", "期末残高", "取得日", "", "",
        ])
    }

    #[test]
    fn reads_a_typical_row() {
        let rows = vec![
            text_row(&["有給休暇管理"]),
            header(),
            vec![
                Cell::Number(1001.0),
                Cell::Text("佐藤 花子".into()),
                Cell::Text("Plant A".into()),
                Cell::Number(44287.0), // 2021-04-01
                Cell::Date(d(2025, 10, 1)),
                Cell::Number(14.0),
                Cell::Number(2.5),
                Cell::Number(11.5),
                Cell::Text("2025/11/04".into()),
                Cell::Number(45996.0), // 2025-12-05
                Cell::Text("2026/01/09半".into()),
            ],
        ];
        let sheet = parse(DEFAULT_SHEET, &rows, 4).unwrap();
        assert!(sheet.issues.is_empty(), "{:?}", sheet.issues);
        let rec = &sheet.records[0];
        assert_eq!(rec.row, 3);
        assert_eq!(rec.employee_num, "1001");
        assert_eq!(rec.year, 2025);
        assert_eq!(rec.hire_date, Some(d(2021, 4, 1)));
        assert_eq!(rec.granted, 14.0);
        assert_eq!(rec.used, 2.5);
        assert_eq!(rec.expired, 0.0);
        assert_eq!(
            rec.usage,
            vec![(d(2025, 11, 4), 1.0), (d(2025, 12, 5), 1.0), (d(2026, 1, 9), 0.5)]
        );
    }

    #[test]
    fn derives_expired_from_closing_balance() {
        let rows = vec![
            header(),
            text_row(&["1002", "Suzuki", "", "", "2024/10/01", "10", "3", "5"]),
        ];
        let rec = &parse(DEFAULT_SHEET, &rows, 4).unwrap().records[0];
        assert_eq!(rec.year, 2024);
        assert_eq!(rec.expired, 2.0);
    }

    #[test]
    fn bad_rows_become_issues() {
        let rows = vec![
            header(),
            text_row(&["1003", "Tanaka", "", "", "", "10", "1"]),
            text_row(&["1004", "Ito", "", "", "2025/10/01", "10", "12"]),
            text_row(&["", "", "", "", "", "", ""]),
            text_row(&["1005", "Kato", "", "", "2025/10/01", "ten"]),
            text_row(&["1006", "Mori", "", "", "2025/10/01", "10", "1"]),
            text_row(&["1006", "Mori", "", "", "2025/10/01", "10", "2"]),
        ];
        let sheet = parse(DEFAULT_SHEET, &rows, 4).unwrap();
        assert_eq!(sheet.records.len(), 1);
        assert_eq!(sheet.records[0].used, 1.0);
        let rows_with_issues: Vec<usize> = sheet.issues.iter().map(|i| i.row).collect();
        assert_eq!(rows_with_issues, vec![2, 3, 5, 7]);
        assert!(sheet.issues[1].message.contains("exceeds granted"));
    }

    #[test]
    fn missing_header_is_an_error() {
        let rows = vec![text_row(&["foo", "bar"])];
        assert!(parse(DEFAULT_SHEET, &rows, 4).is_err());
    }
}
