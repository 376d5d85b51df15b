use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::fiscal::{
    Allocation, FiscalError, FiscalResult,
    calendar::{fiscal_year_of, inclusive_days},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Reverted,
    Cancelled,
}

impl LeaveStatus {
    /// PENDING → {APPROVED, REJECTED, CANCELLED}, APPROVED → REVERTED.
    pub fn can_transition_to(self, next: LeaveStatus) -> bool {
        use LeaveStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Cancelled) | (Approved, Reverted)
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum LeaveUnit {
    FullDay,
    HalfDay,
    Hourly,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LeaveType {
    /// Statutory paid leave, deducted from the balance.
    Paid,
    Special,
    Unpaid,
}

impl LeaveType {
    pub fn deducts_balance(self) -> bool {
        self == LeaveType::Paid
    }
}

/// Length of a request in leave days.
pub fn requested_days(
    start: NaiveDate,
    end: NaiveDate,
    unit: LeaveUnit,
    hours: Option<f64>,
    hours_per_day: f64,
) -> FiscalResult<f64> {
    let span = inclusive_days(start, end)?;
    match unit {
        LeaveUnit::FullDay => Ok(span as f64),
        LeaveUnit::HalfDay | LeaveUnit::Hourly if span != 1 => Err(FiscalError::invalid(format!(
            "{unit} requests must start and end on the same day"
        ))),
        LeaveUnit::HalfDay => Ok(0.5),
        LeaveUnit::Hourly => {
            let hours = hours.ok_or_else(|| FiscalError::invalid("hourly requests need hours"))?;
            if !hours.is_finite() || hours <= 0.0 || hours >= hours_per_day {
                return Err(FiscalError::invalid(format!(
                    "hours must be between 0 and {hours_per_day} (exclusive), got {hours}"
                )));
            }
            Ok(hours / hours_per_day)
        }
    }
}

/// Fiscal year the request is charged to; a request may not straddle two.
pub fn charged_year(start: NaiveDate, end: NaiveDate, start_month: u32) -> FiscalResult<i32> {
    let year = fiscal_year_of(start, start_month);
    if fiscal_year_of(end, start_month) != year {
        return Err(FiscalError::invalid(format!(
            "request {start}..{end} spans two fiscal years"
        )));
    }
    Ok(year)
}

/// Per-day usage rows recorded when a request is approved.
pub fn usage_days(start: NaiveDate, end: NaiveDate, unit: LeaveUnit, days: f64) -> Vec<(NaiveDate, f64)> {
    match unit {
        LeaveUnit::FullDay => start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| (d, 1.0))
            .collect(),
        LeaveUnit::HalfDay | LeaveUnit::Hourly => vec![(start, days)],
    }
}

/// Row as stored; enums are kept as text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeaveRequestRow {
    pub id: u64,
    pub employee_num: String,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub unit: String,
    pub hours: Option<f64>,
    pub days_requested: f64,
    pub leave_type: String,
    pub reason: Option<String>,
    pub status: String,
    pub requested_by: Option<u64>,
    pub approver: Option<u64>,
    pub decided_at: Option<DateTime<Utc>>,
    pub deductions: Option<Json<Vec<Allocation>>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 12,
    "employee_num": "E1024",
    "year": 2025,
    "start_date": "2025-08-12",
    "end_date": "2025-08-14",
    "unit": "FULL_DAY",
    "hours": null,
    "days_requested": 3.0,
    "leave_type": "PAID",
    "reason": "Obon",
    "status": "APPROVED",
    "requested_by": 7,
    "approver": 2,
    "decided_at": "2025-08-01T10:00:00Z",
    "deductions": [{"year": 2025, "days": 3.0}],
    "created_at": "2025-07-30T08:12:00Z",
    "updated_at": "2025-08-01T10:00:00Z"
}))]
pub struct LeaveRequest {
    pub id: u64,
    pub employee_num: String,
    pub year: i32,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub unit: LeaveUnit,
    pub hours: Option<f64>,
    pub days_requested: f64,
    pub leave_type: LeaveType,
    pub reason: Option<String>,
    pub status: LeaveStatus,
    pub requested_by: Option<u64>,
    pub approver: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub decided_at: Option<DateTime<Utc>>,
    /// Per-year days taken on approval; empty until approved.
    pub deductions: Vec<Allocation>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LeaveRequestRow> for LeaveRequest {
    type Error = anyhow::Error;

    fn try_from(row: LeaveRequestRow) -> Result<Self, Self::Error> {
        let parse_err = |field: &str, value: &str| {
            anyhow::anyhow!("leave_requests.{field} holds unknown value {value:?} (id {})", row.id)
        };
        Ok(Self {
            unit: row.unit.parse().map_err(|_| parse_err("unit", &row.unit))?,
            leave_type: row
                .leave_type
                .parse()
                .map_err(|_| parse_err("leave_type", &row.leave_type))?,
            status: row.status.parse().map_err(|_| parse_err("status", &row.status))?,
            id: row.id,
            employee_num: row.employee_num,
            year: row.year,
            start_date: row.start_date,
            end_date: row.end_date,
            hours: row.hours,
            days_requested: row.days_requested,
            reason: row.reason,
            requested_by: row.requested_by,
            approver: row.approver,
            decided_at: row.decided_at,
            deductions: row.deductions.map(|j| j.0).unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn state_machine_transitions() {
        use LeaveStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Reverted));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Reverted.can_transition_to(Approved));
        assert!(!Pending.can_transition_to(Reverted));
    }

    #[test]
    fn counts_requested_days() {
        assert_eq!(
            requested_days(d(2025, 5, 1), d(2025, 5, 3), LeaveUnit::FullDay, None, 8.0).unwrap(),
            3.0
        );
        assert_eq!(
            requested_days(d(2025, 5, 1), d(2025, 5, 1), LeaveUnit::HalfDay, None, 8.0).unwrap(),
            0.5
        );
        assert_eq!(
            requested_days(d(2025, 5, 1), d(2025, 5, 1), LeaveUnit::Hourly, Some(2.0), 8.0).unwrap(),
            0.25
        );
    }

    #[test]
    fn rejects_malformed_requests() {
        assert!(requested_days(d(2025, 5, 3), d(2025, 5, 1), LeaveUnit::FullDay, None, 8.0).is_err());
        assert!(requested_days(d(2025, 5, 1), d(2025, 5, 2), LeaveUnit::HalfDay, None, 8.0).is_err());
        assert!(requested_days(d(2025, 5, 1), d(2025, 5, 1), LeaveUnit::Hourly, None, 8.0).is_err());
        assert!(
            requested_days(d(2025, 5, 1), d(2025, 5, 1), LeaveUnit::Hourly, Some(8.0), 8.0).is_err()
        );
    }

    #[test]
    fn requests_stay_inside_one_fiscal_year() {
        assert_eq!(charged_year(d(2025, 4, 1), d(2025, 4, 2), 4).unwrap(), 2025);
        assert!(charged_year(d(2025, 3, 31), d(2025, 4, 1), 4).is_err());
    }

    #[test]
    fn splits_usage_per_day() {
        let rows = usage_days(d(2025, 5, 1), d(2025, 5, 3), LeaveUnit::FullDay, 3.0);
        assert_eq!(rows, vec![(d(2025, 5, 1), 1.0), (d(2025, 5, 2), 1.0), (d(2025, 5, 3), 1.0)]);
        let rows = usage_days(d(2025, 5, 1), d(2025, 5, 1), LeaveUnit::HalfDay, 0.5);
        assert_eq!(rows, vec![(d(2025, 5, 1), 0.5)]);
    }

    #[test]
    fn enums_round_trip_storage_text() {
        assert_eq!(LeaveUnit::FullDay.as_ref(), "FULL_DAY");
        assert_eq!("half_day".parse::<LeaveUnit>().unwrap(), LeaveUnit::HalfDay);
        assert_eq!(LeaveStatus::Cancelled.to_string(), "CANCELLED");
    }
}
