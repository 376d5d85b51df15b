use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::fiscal::{FiscalResult, YearBalance, balance::usage_rate};

/// One employee's leave record for one fiscal year.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "employee_num": "E1024",
        "year": 2025,
        "name": "山田 太郎",
        "haken": "Tokai Plant",
        "hire_date": "2021-04-01",
        "grant_date": "2025-10-01",
        "granted": 14.0,
        "used": 4.5,
        "expired": 0.0,
        "balance": 9.5,
        "carried_over": 6.0,
        "usage_rate": 32.14,
        "closed_at": null,
        "updated_at": "2026-01-10T09:00:00Z"
    })
)]
pub struct Employee {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "E1024")]
    pub employee_num: String,

    #[schema(example = 2025)]
    pub year: i32,

    #[schema(example = "山田 太郎")]
    pub name: String,

    /// Dispatch destination.
    #[schema(example = "Tokai Plant", nullable = true)]
    pub haken: Option<String>,

    #[schema(value_type = Option<String>, format = "date", example = "2021-04-01")]
    pub hire_date: Option<NaiveDate>,

    #[schema(value_type = Option<String>, format = "date", example = "2025-10-01")]
    pub grant_date: Option<NaiveDate>,

    pub granted: f64,
    pub used: f64,
    pub expired: f64,
    pub balance: f64,

    /// Days brought forward from the previous year's row.
    pub carried_over: f64,

    pub usage_rate: f64,

    /// Set once the year-end close of this year has run.
    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub closed_at: Option<DateTime<Utc>>,

    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn year_balance(&self) -> FiscalResult<YearBalance> {
        YearBalance::new(self.year, self.granted, self.used, self.expired)
    }

    /// Copies engine results back onto the row and refreshes derived columns.
    pub fn apply(&mut self, balance: &YearBalance) {
        self.used = balance.used;
        self.expired = balance.expired;
        self.balance = balance.remaining();
        self.usage_rate = usage_rate(self.granted, self.used);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Employee {
        Employee {
            id: 1,
            employee_num: "E1".into(),
            year: 2025,
            name: "Sato".into(),
            haken: None,
            hire_date: None,
            grant_date: None,
            granted: 12.0,
            used: 2.0,
            expired: 0.0,
            balance: 10.0,
            carried_over: 0.0,
            usage_rate: 16.67,
            closed_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn apply_refreshes_derived_columns() {
        let mut row = sample();
        let mut b = row.year_balance().unwrap();
        b.used = 6.0;
        row.apply(&b);
        assert_eq!(row.balance, 6.0);
        assert_eq!(row.usage_rate, 50.0);
    }
}
