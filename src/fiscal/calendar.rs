use chrono::{Datelike, Months, NaiveDate};

use super::error::{FiscalError, FiscalResult};

/// Whole months from `from` to `to`, counting a month only once its anniversary day
/// is reached. Month-end anniversaries clamp, so Aug 31 + 6 months is Feb 28/29.
pub fn elapsed_months(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }
    let estimate = (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32;
    let mut months = estimate.max(0) as u32;
    while months > 0 && add_months(from, months) > to {
        months -= 1;
    }
    months
}

pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Fiscal year a date belongs to when years start on the first day of `start_month`.
pub fn fiscal_year_of(date: NaiveDate, start_month: u32) -> i32 {
    if date.month() >= start_month {
        date.year()
    } else {
        date.year() - 1
    }
}

pub fn fiscal_year_start(year: i32, start_month: u32) -> FiscalResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, start_month, 1).ok_or_else(|| {
        FiscalError::invalid(format!(
            "no fiscal year start for year {year}, month {start_month}"
        ))
    })
}

/// Days granted in fiscal year `year` lapse when fiscal year `year + 2` begins.
pub fn expiry_date(year: i32, start_month: u32) -> FiscalResult<NaiveDate> {
    fiscal_year_start(year + 2, start_month)
}

/// Calendar days in `[start, end]`.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> FiscalResult<u32> {
    if end < start {
        return Err(FiscalError::invalid(format!(
            "end date {end} is before start date {start}"
        )));
    }
    Ok((end - start).num_days() as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn months_count_only_reached_anniversaries() {
        assert_eq!(elapsed_months(d(2024, 1, 15), d(2024, 7, 14)), 5);
        assert_eq!(elapsed_months(d(2024, 1, 15), d(2024, 7, 15)), 6);
        assert_eq!(elapsed_months(d(2024, 8, 31), d(2025, 2, 28)), 6);
        assert_eq!(elapsed_months(d(2024, 5, 1), d(2024, 4, 1)), 0);
    }

    #[test]
    fn fiscal_year_starts_in_april() {
        assert_eq!(fiscal_year_of(d(2025, 3, 31), 4), 2024);
        assert_eq!(fiscal_year_of(d(2025, 4, 1), 4), 2025);
        assert_eq!(fiscal_year_of(d(2025, 1, 1), 1), 2025);
    }

    #[test]
    fn grants_expire_two_fiscal_years_later() {
        assert_eq!(expiry_date(2024, 4).unwrap(), d(2026, 4, 1));
    }

    #[test]
    fn inclusive_day_count() {
        assert_eq!(inclusive_days(d(2025, 5, 1), d(2025, 5, 3)).unwrap(), 3);
        assert!(inclusive_days(d(2025, 5, 3), d(2025, 5, 1)).is_err());
    }
}
