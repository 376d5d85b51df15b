//! Statutory grant schedule (Labor Standards Act Art. 39).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::calendar::{add_months, elapsed_months};
use super::error::{FiscalError, FiscalResult};

/// First grant happens after six months of service.
const FIRST_GRANT_MONTHS: u32 = 6;

/// Days granted at 0.5, 1.5, ... 6.5+ years of service.
const FULL_TIME_TABLE: [f64; 7] = [10.0, 11.0, 12.0, 14.0, 16.0, 18.0, 20.0];

/// Proportional grants, indexed by scheduled days per week (1..=4).
const PART_TIME_TABLE: [[f64; 7]; 4] = [
    [1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0],
    [3.0, 4.0, 4.0, 5.0, 6.0, 6.0, 7.0],
    [5.0, 6.0, 6.0, 8.0, 9.0, 10.0, 11.0],
    [7.0, 8.0, 9.0, 10.0, 12.0, 13.0, 15.0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkPattern {
    #[default]
    FullTime,
    /// Four or fewer scheduled days a week (and under 30 hours).
    PartTime { days_per_week: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GrantPreview {
    #[schema(value_type = String, format = "date")]
    pub hire_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub as_of: NaiveDate,
    /// Service length floored to the half-year.
    #[schema(example = 2.5)]
    pub seniority_years: f64,
    #[schema(example = 12.0)]
    pub granted_days: f64,
    #[schema(value_type = String, format = "date")]
    pub next_grant_date: NaiveDate,
    #[schema(example = 14.0)]
    pub next_grant_days: f64,
}

/// Index into the grant tables, `None` before the first grant.
fn table_index(months: u32) -> Option<usize> {
    if months < FIRST_GRANT_MONTHS {
        return None;
    }
    let idx = ((months - FIRST_GRANT_MONTHS) / 12) as usize;
    Some(idx.min(FULL_TIME_TABLE.len() - 1))
}

fn ensure_hired(hire_date: NaiveDate, as_of: NaiveDate) -> FiscalResult<u32> {
    if as_of < hire_date {
        return Err(FiscalError::invalid(format!(
            "evaluation date {as_of} is before hire date {hire_date}"
        )));
    }
    Ok(elapsed_months(hire_date, as_of))
}

fn days_for_index(pattern: WorkPattern, idx: usize) -> FiscalResult<f64> {
    match pattern {
        WorkPattern::FullTime => Ok(FULL_TIME_TABLE[idx]),
        WorkPattern::PartTime { days_per_week } => match days_per_week {
            1..=4 => Ok(PART_TIME_TABLE[days_per_week as usize - 1][idx]),
            other => Err(FiscalError::invalid(format!(
                "part-time schedule must be 1-4 days per week, got {other}"
            ))),
        },
    }
}

/// Days granted by the most recent grant on or before `as_of`.
pub fn grant_days(hire_date: NaiveDate, as_of: NaiveDate) -> FiscalResult<f64> {
    grant_days_for(hire_date, as_of, WorkPattern::FullTime)
}

pub fn grant_days_for(
    hire_date: NaiveDate,
    as_of: NaiveDate,
    pattern: WorkPattern,
) -> FiscalResult<f64> {
    let months = ensure_hired(hire_date, as_of)?;
    match table_index(months) {
        Some(idx) => days_for_index(pattern, idx),
        None => {
            // still validate the pattern so bad input is reported consistently
            days_for_index(pattern, 0)?;
            Ok(0.0)
        }
    }
}

/// Length of service floored to the half-year boundary.
pub fn seniority_years(hire_date: NaiveDate, as_of: NaiveDate) -> FiscalResult<f64> {
    let months = ensure_hired(hire_date, as_of)?;
    Ok((months / 6) as f64 * 0.5)
}

/// Grant date strictly after `as_of`.
pub fn next_grant_date(hire_date: NaiveDate, as_of: NaiveDate) -> FiscalResult<NaiveDate> {
    let months = ensure_hired(hire_date, as_of)?;
    let next = match table_index(months) {
        None => FIRST_GRANT_MONTHS,
        Some(_) => FIRST_GRANT_MONTHS + ((months - FIRST_GRANT_MONTHS) / 12 + 1) * 12,
    };
    Ok(add_months(hire_date, next))
}

/// Most recent grant date on or before `as_of`, if any grant has happened.
pub fn last_grant_date(hire_date: NaiveDate, as_of: NaiveDate) -> FiscalResult<Option<NaiveDate>> {
    let months = ensure_hired(hire_date, as_of)?;
    Ok(table_index(months).map(|_| {
        let since = FIRST_GRANT_MONTHS + (months - FIRST_GRANT_MONTHS) / 12 * 12;
        add_months(hire_date, since)
    }))
}

pub fn preview(
    hire_date: NaiveDate,
    as_of: NaiveDate,
    pattern: WorkPattern,
) -> FiscalResult<GrantPreview> {
    let next = next_grant_date(hire_date, as_of)?;
    Ok(GrantPreview {
        hire_date,
        as_of,
        seniority_years: seniority_years(hire_date, as_of)?,
        granted_days: grant_days_for(hire_date, as_of, pattern)?,
        next_grant_date: next,
        next_grant_days: grant_days_for(hire_date, next, pattern)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn follows_full_time_schedule() {
        let hire = d(2018, 4, 1);
        assert_eq!(grant_days(hire, d(2018, 9, 30)).unwrap(), 0.0);
        assert_eq!(grant_days(hire, d(2018, 10, 1)).unwrap(), 10.0);
        assert_eq!(grant_days(hire, d(2019, 10, 1)).unwrap(), 11.0);
        assert_eq!(grant_days(hire, d(2020, 10, 1)).unwrap(), 12.0);
        assert_eq!(grant_days(hire, d(2021, 10, 1)).unwrap(), 14.0);
        assert_eq!(grant_days(hire, d(2022, 10, 1)).unwrap(), 16.0);
        assert_eq!(grant_days(hire, d(2023, 10, 1)).unwrap(), 18.0);
        assert_eq!(grant_days(hire, d(2024, 10, 1)).unwrap(), 20.0);
    }

    #[test]
    fn caps_at_twenty_days() {
        assert_eq!(grant_days(d(1990, 1, 1), d(2026, 1, 1)).unwrap(), 20.0);
    }

    #[test]
    fn floors_to_half_year() {
        let hire = d(2023, 4, 1);
        // one day short of 1.5 years still counts as 0.5
        assert_eq!(grant_days(hire, d(2024, 9, 30)).unwrap(), 10.0);
        assert_eq!(seniority_years(hire, d(2024, 9, 30)).unwrap(), 1.0);
        assert_eq!(seniority_years(hire, d(2024, 10, 1)).unwrap(), 1.5);
    }

    #[test]
    fn proportional_grants_for_part_time() {
        let hire = d(2020, 4, 1);
        let pattern = WorkPattern::PartTime { days_per_week: 3 };
        assert_eq!(grant_days_for(hire, d(2020, 10, 1), pattern).unwrap(), 5.0);
        assert_eq!(grant_days_for(hire, d(2023, 10, 1), pattern).unwrap(), 8.0);
        let bad = WorkPattern::PartTime { days_per_week: 5 };
        assert!(grant_days_for(hire, d(2023, 10, 1), bad).is_err());
    }

    #[test]
    fn evaluation_before_hire_is_invalid() {
        let err = grant_days(d(2025, 4, 1), d(2025, 1, 1)).unwrap_err();
        assert!(matches!(err, FiscalError::InvalidInput(_)));
    }

    #[test]
    fn next_and_last_grant_dates() {
        let hire = d(2022, 4, 1);
        assert_eq!(next_grant_date(hire, d(2022, 5, 1)).unwrap(), d(2022, 10, 1));
        assert_eq!(next_grant_date(hire, d(2022, 10, 1)).unwrap(), d(2023, 10, 1));
        assert_eq!(last_grant_date(hire, d(2022, 5, 1)).unwrap(), None);
        assert_eq!(last_grant_date(hire, d(2024, 3, 1)).unwrap(), Some(d(2023, 10, 1)));
    }

    #[test]
    fn preview_reports_upcoming_grant() {
        let p = preview(d(2022, 4, 1), d(2024, 3, 1), WorkPattern::FullTime).unwrap();
        assert_eq!(p.granted_days, 11.0);
        assert_eq!(p.next_grant_date, d(2024, 10, 1));
        assert_eq!(p.next_grant_days, 12.0);
    }
}
