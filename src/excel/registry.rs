//! Employee master sheets (`DBGenzaiX`, `DBUkeoiX`, `DBStaffX`).

use anyhow::bail;

use super::{Cell, RowIssue, locate_header};
use crate::store::registry::NewRegistryEmployee;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    EmployeeNum,
    Name,
    Kana,
    Haken,
    HireDate,
    LeaveDate,
    Status,
    HourlyWage,
}

const ALIASES: &[(Field, &[&str])] = &[
    (Field::EmployeeNum, &["社員№", "社員番号", "従業員番号"]),
    (Field::Name, &["氏名", "名前"]),
    (Field::Kana, &["カナ", "フリガナ", "氏名カナ", "ふりがな"]),
    (Field::Haken, &["派遣先", "請負業務", "配属先", "所属"]),
    (Field::HireDate, &["入社日"]),
    (Field::LeaveDate, &["退社日", "退職日"]),
    (Field::Status, &["現在", "在籍", "状態"]),
    (Field::HourlyWage, &["時給", "単価"]),
];

pub const ACTIVE: &str = "active";
pub const RESIGNED: &str = "resigned";

/// Maps the sheet's status wording onto the stored values.
fn status_of(raw: Option<&str>, has_leave_date: bool) -> String {
    match raw.map(str::trim) {
        Some("在職中" | "在籍" | "在職") => ACTIVE.to_string(),
        Some("退社" | "退職" | "退社済") => RESIGNED.to_string(),
        Some(other) if !other.is_empty() => other.to_string(),
        _ if has_leave_date => RESIGNED.to_string(),
        _ => ACTIVE.to_string(),
    }
}

#[derive(Debug, Default)]
pub struct RegistrySheet {
    pub records: Vec<NewRegistryEmployee>,
    pub issues: Vec<RowIssue>,
}

pub fn parse(sheet: &str, rows: &[Vec<Cell>]) -> anyhow::Result<RegistrySheet> {
    let Some(cols) = locate_header(rows, ALIASES, Field::EmployeeNum) else {
        bail!("sheet {sheet:?} has no header row with a 社員№ column");
    };

    let mut out = RegistrySheet::default();
    for (idx, row) in rows.iter().enumerate().skip(cols.header_row + 1) {
        if row.iter().all(Cell::is_empty) {
            continue;
        }
        let employee_num = cols.text(row, Field::EmployeeNum);
        let issue = |message: &str| RowIssue {
            sheet: sheet.to_string(),
            row: idx + 1,
            employee_num: employee_num.clone(),
            message: message.to_string(),
        };

        let Some(num) = employee_num.clone() else {
            out.issues.push(issue("missing employee number"));
            continue;
        };
        let Some(name) = cols.text(row, Field::Name) else {
            out.issues.push(issue("missing name"));
            continue;
        };

        let wage_cell = cols.cell(row, Field::HourlyWage);
        let hourly_wage = wage_cell.as_f64();
        if !wage_cell.is_empty() && hourly_wage.is_none() {
            out.issues.push(issue("hourly wage is not a number, left blank"));
        }

        let leave_date = cols.cell(row, Field::LeaveDate).as_date();
        out.records.push(NewRegistryEmployee {
            employee_num: num,
            name,
            kana: cols.text(row, Field::Kana),
            haken: cols.text(row, Field::Haken),
            hire_date: cols.cell(row, Field::HireDate).as_date(),
            leave_date,
            status: status_of(cols.text(row, Field::Status).as_deref(), leave_date.is_some()),
            hourly_wage,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excel::text_row;
    use chrono::NaiveDate;

    #[test]
    fn reads_registry_rows() {
        let rows = vec![
            text_row(&["現在", "社員№", "派遣先", "氏名", "カナ", "時給", "入社日", "退社日"]),
            text_row(&["在職中", "2001", "Plant A", "高橋 健", "タカハシ ケン", "1,450", "2022/04/01", ""]),
            text_row(&["", "2002", "Plant B", "中村 愛", "", "", "2020/10/01", "2025/03/31"]),
            text_row(&["在職中", "", "Plant B", "Nobody", "", "", "", ""]),
        ];
        let sheet = parse("DBGenzaiX", &rows).unwrap();
        assert_eq!(sheet.records.len(), 2);

        let first = &sheet.records[0];
        assert_eq!(first.status, ACTIVE);
        assert_eq!(first.hourly_wage, Some(1450.0));
        assert_eq!(first.hire_date, NaiveDate::from_ymd_opt(2022, 4, 1));

        let second = &sheet.records[1];
        assert_eq!(second.status, RESIGNED);
        assert_eq!(second.kana, None);

        assert_eq!(sheet.issues.len(), 1);
        assert_eq!(sheet.issues[0].row, 4);
    }

    #[test]
    fn status_wording() {
        assert_eq!(status_of(Some("退社"), false), RESIGNED);
        assert_eq!(status_of(None, false), ACTIVE);
        assert_eq!(status_of(Some("休職"), false), "休職");
    }
}
