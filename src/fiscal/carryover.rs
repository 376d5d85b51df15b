use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::balance::YearBalance;
use super::calendar::{expiry_date, fiscal_year_start};
use super::deduction::{self, Allocation};
use super::error::{FiscalError, FiscalResult, ensure_non_negative};
use super::grant::{WorkPattern, grant_days_for};

/// Statutory ceiling on days held across years.
pub const DEFAULT_CARRYOVER_CAP_DAYS: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CarryoverOutcome {
    #[schema(example = 2025)]
    pub closing_year: i32,
    /// Days of the closing year that move into the next one.
    #[schema(example = 40.0)]
    pub carried: f64,
    /// Rows that reached the two-year limit, with what lapsed from each.
    pub expired_by_age: Vec<Allocation>,
    /// Days above the cap, marked expired on the closing year's row.
    #[schema(example = 5.0)]
    pub expired_by_cap: f64,
}

impl CarryoverOutcome {
    pub fn total_expired(&self) -> f64 {
        self.expired_by_age.iter().map(|a| a.days).sum::<f64>() + self.expired_by_cap
    }
}

/// Closes fiscal year `closing_year` in place.
///
/// Rows granted before the closing year lapse in full. The closing year's
/// remainder is carried, and anything above `cap` is marked expired on that row.
pub fn close_year(
    balances: &mut [YearBalance],
    closing_year: i32,
    cap: f64,
) -> FiscalResult<CarryoverOutcome> {
    ensure_non_negative("carryover cap", cap)?;

    let mut expired_by_age = Vec::new();
    for row in balances.iter_mut().filter(|b| b.year < closing_year) {
        let lapsed = row.expire_all();
        if lapsed > 0.0 {
            expired_by_age.push(Allocation {
                year: row.year,
                days: lapsed,
            });
        }
    }

    let mut carried = 0.0;
    let mut expired_by_cap = 0.0;
    if let Some(row) = balances.iter_mut().find(|b| b.year == closing_year) {
        let left = row.remaining();
        if left > cap {
            expired_by_cap = row.expire(left - cap);
        }
        carried = row.remaining();
    }

    Ok(CarryoverOutcome {
        closing_year,
        carried,
        expired_by_age,
        expired_by_cap,
    })
}

/// Gives deducted days back after year-end closes may already have run.
///
/// `closed_through` is the latest closed fiscal year. Rows older than it have
/// lapsed, so days returned to them expire at once. Its own row keeps at most
/// `cap` days. Returns what expired on the way back.
pub fn restore_after_close(
    balances: &mut [YearBalance],
    allocations: &[Allocation],
    closed_through: Option<i32>,
    cap: f64,
) -> FiscalResult<Vec<Allocation>> {
    ensure_non_negative("carryover cap", cap)?;
    deduction::restore(balances, allocations)?;

    let Some(closed) = closed_through else {
        return Ok(Vec::new());
    };
    let mut lapsed = Vec::new();
    for alloc in allocations.iter().filter(|a| a.year <= closed) {
        let Some(row) = balances.iter_mut().find(|b| b.year == alloc.year) else {
            continue;
        };
        let days = if row.year < closed {
            row.expire(alloc.days)
        } else {
            let left = row.remaining();
            if left > cap { row.expire(left - cap) } else { 0.0 }
        };
        if days > 0.0 {
            lapsed.push(Allocation {
                year: row.year,
                days,
            });
        }
    }
    Ok(lapsed)
}

/// Grant for fiscal year `year`, evaluated on its last day.
pub fn grant_for_fiscal_year(
    hire_date: NaiveDate,
    year: i32,
    start_month: u32,
    pattern: WorkPattern,
) -> FiscalResult<f64> {
    let year_end = fiscal_year_start(year + 1, start_month)? - Duration::days(1);
    if hire_date > year_end {
        return Ok(0.0);
    }
    grant_days_for(hire_date, year_end, pattern)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExpiringDays {
    #[schema(example = 2024)]
    pub year: i32,
    #[schema(example = 3.0)]
    pub days: f64,
    #[schema(value_type = String, format = "date")]
    pub expires_on: NaiveDate,
}

/// Rows with days left that lapse within `window_days` after `as_of`.
pub fn expiring_within(
    balances: &[YearBalance],
    as_of: NaiveDate,
    window_days: i64,
    start_month: u32,
) -> FiscalResult<Vec<ExpiringDays>> {
    if window_days < 0 {
        return Err(FiscalError::invalid(format!(
            "warning window must not be negative, got {window_days}"
        )));
    }
    let horizon = as_of + Duration::days(window_days);

    let mut out = Vec::new();
    for row in balances {
        let days = row.remaining();
        if days <= 0.0 {
            continue;
        }
        let expires_on = expiry_date(row.year, start_month)?;
        if expires_on > as_of && expires_on <= horizon {
            out.push(ExpiringDays {
                year: row.year,
                days,
                expires_on,
            });
        }
    }
    out.sort_by_key(|e| e.expires_on);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn caps_carry_and_reports_excess() {
        let mut b = vec![YearBalance::new(2025, 45.0, 0.0, 0.0).unwrap()];
        let out = close_year(&mut b, 2025, DEFAULT_CARRYOVER_CAP_DAYS).unwrap();
        assert_eq!(out.carried, 40.0);
        assert_eq!(out.expired_by_cap, 5.0);
        assert_eq!(b[0].expired, 5.0);
        assert_eq!(b[0].remaining(), 40.0);
    }

    #[test]
    fn older_rows_lapse_after_two_years() {
        let mut b = vec![
            YearBalance::new(2024, 11.0, 4.0, 0.0).unwrap(),
            YearBalance::new(2025, 12.0, 2.0, 0.0).unwrap(),
        ];
        let out = close_year(&mut b, 2025, DEFAULT_CARRYOVER_CAP_DAYS).unwrap();
        assert_eq!(out.expired_by_age, vec![Allocation { year: 2024, days: 7.0 }]);
        assert_eq!(out.carried, 10.0);
        assert_eq!(out.total_expired(), 7.0);
        assert_eq!(b[0].remaining(), 0.0);
        assert_eq!(b[0].granted - b[0].used - b[0].expired, 0.0);
    }

    #[test]
    fn later_rows_are_untouched() {
        let mut b = vec![
            YearBalance::new(2025, 12.0, 0.0, 0.0).unwrap(),
            YearBalance::new(2026, 14.0, 0.0, 0.0).unwrap(),
        ];
        close_year(&mut b, 2025, 10.0).unwrap();
        assert_eq!(b[1].remaining(), 14.0);
        assert_eq!(b[0].remaining(), 10.0);
    }

    #[test]
    fn missing_closing_row_carries_nothing() {
        let mut b = vec![YearBalance::new(2023, 10.0, 0.0, 0.0).unwrap()];
        let out = close_year(&mut b, 2025, 40.0).unwrap();
        assert_eq!(out.carried, 0.0);
        assert_eq!(out.total_expired(), 10.0);
    }

    #[test]
    fn fiscal_year_grant_uses_year_end() {
        // hired 2024-10-01: first grant 2025-04-01, inside fiscal 2025
        let hire = d(2024, 10, 1);
        assert_eq!(grant_for_fiscal_year(hire, 2024, 4, WorkPattern::FullTime).unwrap(), 0.0);
        assert_eq!(grant_for_fiscal_year(hire, 2025, 4, WorkPattern::FullTime).unwrap(), 10.0);
        assert_eq!(grant_for_fiscal_year(hire, 2023, 4, WorkPattern::FullTime).unwrap(), 0.0);
    }

    #[test]
    fn flags_rows_expiring_soon() {
        let b = vec![
            YearBalance::new(2024, 11.0, 4.0, 0.0).unwrap(),
            YearBalance::new(2025, 12.0, 12.0, 0.0).unwrap(),
        ];
        let soon = expiring_within(&b, d(2026, 2, 1), 90, 4).unwrap();
        assert_eq!(
            soon,
            vec![ExpiringDays { year: 2024, days: 7.0, expires_on: d(2026, 4, 1) }]
        );
        assert!(expiring_within(&b, d(2025, 6, 1), 30, 4).unwrap().is_empty());
    }

    #[test]
    fn revert_into_lapsed_year_expires_the_days() {
        let mut b = vec![
            YearBalance::new(2024, 11.0, 6.0, 0.0).unwrap(),
            YearBalance::new(2025, 12.0, 0.0, 0.0).unwrap(),
        ];
        let plan = deduction::deduct(&mut b, 3.0, deduction::DeductionPolicy::Fifo).unwrap();
        assert_eq!(plan, vec![Allocation { year: 2024, days: 3.0 }]);
        close_year(&mut b, 2025, DEFAULT_CARRYOVER_CAP_DAYS).unwrap();
        assert_eq!(b[0].expired, 2.0);

        let lapsed = restore_after_close(&mut b, &plan, Some(2025), DEFAULT_CARRYOVER_CAP_DAYS).unwrap();
        assert_eq!(lapsed, vec![Allocation { year: 2024, days: 3.0 }]);
        assert_eq!(b[0].used, 6.0);
        assert_eq!(b[0].expired, 5.0);
        assert_eq!(b[0].remaining(), 0.0);

        // a second close finds nothing more to expire
        let again = close_year(&mut b, 2025, DEFAULT_CARRYOVER_CAP_DAYS).unwrap();
        assert_eq!(again.total_expired(), 0.0);
    }

    #[test]
    fn revert_into_closed_year_respects_the_cap() {
        let mut b = vec![YearBalance::new(2025, 45.0, 0.0, 0.0).unwrap()];
        let plan = deduction::deduct(&mut b, 4.0, deduction::DeductionPolicy::Lifo).unwrap();
        close_year(&mut b, 2025, 40.0).unwrap();
        assert_eq!(b[0].expired, 1.0);

        let lapsed = restore_after_close(&mut b, &plan, Some(2025), 40.0).unwrap();
        assert_eq!(lapsed, vec![Allocation { year: 2025, days: 4.0 }]);
        assert_eq!(b[0].remaining(), 40.0);
    }

    #[test]
    fn revert_before_any_close_gives_everything_back() {
        let mut b = vec![YearBalance::new(2025, 12.0, 0.0, 0.0).unwrap()];
        let plan = deduction::deduct(&mut b, 2.0, deduction::DeductionPolicy::Lifo).unwrap();
        let lapsed = restore_after_close(&mut b, &plan, None, 40.0).unwrap();
        assert!(lapsed.is_empty());
        assert_eq!(b[0].remaining(), 12.0);

        let plan = deduction::deduct(&mut b, 2.0, deduction::DeductionPolicy::Lifo).unwrap();
        let lapsed = restore_after_close(&mut b, &plan, Some(2024), 40.0).unwrap();
        assert!(lapsed.is_empty());
        assert_eq!(b[0].remaining(), 12.0);
    }
}
