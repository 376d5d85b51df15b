use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One consumed leave day (or part of one).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct UsageDetail {
    #[schema(example = 301)]
    pub id: u64,
    #[schema(example = "E1024")]
    pub employee_num: String,
    /// Fiscal year the day falls in.
    #[schema(example = 2025)]
    pub year: i32,
    /// Fiscal year whose grant the day was drawn from.
    #[schema(example = 2024)]
    pub grant_year: i32,
    #[schema(value_type = String, format = "date", example = "2025-08-12")]
    pub use_date: NaiveDate,
    #[schema(example = 1.0)]
    pub days_used: f64,
    /// Absent for days imported from the ledger workbook.
    #[schema(example = 12, nullable = true)]
    pub leave_request_id: Option<u64>,
}

/// A day of an approved request, charged to one grant year.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargedDay {
    pub use_date: NaiveDate,
    pub days_used: f64,
    pub grant_year: i32,
}

/// Usage rows of one employee touching a fiscal year.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UsageTotals {
    pub employee_num: String,
    /// Days dated inside the year.
    pub taken: f64,
    /// Days drawn from the year's grant.
    pub consumed: f64,
}
