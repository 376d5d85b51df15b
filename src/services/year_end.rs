//! Fiscal year close: expiry, capped carryover and the next year's grant.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::summary::SummaryCache;
use super::{balances_of, write_back};
use crate::auth::auth::AuthUser;
use crate::config::LeavePolicy;
use crate::error::{ApiError, ApiResult};
use crate::fiscal::{
    WorkPattern,
    calendar::{fiscal_year_of, fiscal_year_start},
    carryover::{self, CarryoverOutcome, ExpiringDays},
    grant::last_grant_date,
};
use crate::model::audit_log::{AuditAction, NewAuditEntry};
use crate::model::employee::Employee;
use crate::model::notification::{NewNotification, NotificationKind};
use crate::store::{
    audit_log, employees, employees::NewEmployee, notifications, registry,
};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmployeeCarryover {
    #[schema(example = "E1024")]
    pub employee_num: String,
    pub carried: f64,
    pub expired_by_age: f64,
    pub expired_by_cap: f64,
    /// Grant on the next year's row.
    pub next_granted: f64,
    /// False when the next year's row already existed.
    pub next_row_created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SkippedEmployee {
    pub employee_num: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct YearEndReport {
    #[schema(example = 2025)]
    pub closing_year: i32,
    pub processed: u32,
    pub rows_created: u32,
    pub total_carried: f64,
    pub total_expired: f64,
    pub employees: Vec<EmployeeCarryover>,
    pub skipped: Vec<SkippedEmployee>,
}

/// Runs the carryover over one employee's locked rows, leaving later years alone.
fn close_rows(rows: &mut [Employee], closing_year: i32, cap: f64) -> ApiResult<CarryoverOutcome> {
    let split = rows.partition_point(|r| r.year <= closing_year);
    let closing = &mut rows[..split];
    let mut balances = balances_of(closing)?;
    let outcome = carryover::close_year(&mut balances, closing_year, cap)?;
    write_back(closing, &balances);
    Ok(outcome)
}

struct NextYear {
    granted: f64,
    grant_date: Option<NaiveDate>,
}

fn next_year_grant(hire_date: Option<NaiveDate>, year: i32, start_month: u32) -> ApiResult<NextYear> {
    let Some(hire) = hire_date else {
        return Ok(NextYear {
            granted: 0.0,
            grant_date: None,
        });
    };
    let year_end = fiscal_year_start(year + 1, start_month)? - Duration::days(1);
    if hire > year_end {
        return Ok(NextYear {
            granted: 0.0,
            grant_date: None,
        });
    }
    Ok(NextYear {
        granted: carryover::grant_for_fiscal_year(hire, year, start_month, WorkPattern::FullTime)?,
        grant_date: last_grant_date(hire, year_end)?,
    })
}

/// Closes `closing_year` for one employee inside its own transaction.
async fn close_employee(
    pool: &MySqlPool,
    policy: &LeavePolicy,
    actor: &AuthUser,
    employee_num: &str,
    closing_year: i32,
) -> ApiResult<EmployeeCarryover> {
    let next_year = closing_year + 1;

    let mut tx = pool.begin().await?;
    let mut rows = employees::lock_history(&mut tx, employee_num, next_year).await?;
    let current = rows
        .iter()
        .find(|r| r.year == closing_year)
        .cloned()
        .ok_or_else(|| ApiError::not_found("Employee leave record"))?;
    let before = serde_json::to_value(&rows).ok();

    let outcome = close_rows(&mut rows, closing_year, policy.carryover_cap_days)?;
    for row in rows.iter().filter(|r| r.year <= closing_year) {
        employees::save_balances(&mut *tx, row).await?;
    }
    employees::mark_closed(&mut *tx, employee_num, closing_year).await?;

    let (next_granted, next_row_created) = match rows.iter_mut().find(|r| r.year == next_year) {
        Some(next) => {
            next.carried_over = outcome.carried;
            employees::save_balances(&mut *tx, next).await?;
            (next.granted, false)
        }
        None => {
            let hire_date = match current.hire_date {
                Some(d) => Some(d),
                None => registry::hire_date_of(&mut *tx, employee_num).await?,
            };
            if hire_date.is_none() {
                warn!(%employee_num, "No hire date on record, next year granted 0 days");
            }
            let grant = next_year_grant(hire_date, next_year, policy.fiscal_year_start_month)?;
            employees::insert(
                &mut *tx,
                &NewEmployee {
                    employee_num: employee_num.to_string(),
                    year: next_year,
                    name: current.name.clone(),
                    haken: current.haken.clone(),
                    hire_date,
                    grant_date: grant.grant_date,
                    granted: grant.granted,
                    used: 0.0,
                    expired: 0.0,
                    carried_over: outcome.carried,
                },
            )
            .await?;
            (grant.granted, true)
        }
    };

    audit_log::insert(
        &mut *tx,
        &NewAuditEntry {
            user_id: Some(actor.user_id),
            action: AuditAction::YearEnd,
            entity_type: "employee",
            entity_id: format!("{employee_num}/{closing_year}"),
            old_value: before,
            new_value: serde_json::to_value(&outcome).ok(),
        },
    )
    .await?;
    tx.commit().await?;

    Ok(EmployeeCarryover {
        employee_num: employee_num.to_string(),
        carried: outcome.carried,
        expired_by_age: outcome.expired_by_age.iter().map(|a| a.days).sum(),
        expired_by_cap: outcome.expired_by_cap,
        next_granted,
        next_row_created,
    })
}

/// Closes `closing_year` for every employee holding a row in it.
///
/// Each employee is committed separately, so a rerun picks up where a failed
/// run stopped; rows that were already closed come out unchanged.
#[instrument(skip(pool, policy, cache, actor), fields(user_id = actor.user_id))]
pub async fn run(
    pool: &MySqlPool,
    policy: &LeavePolicy,
    cache: &SummaryCache,
    actor: &AuthUser,
    closing_year: i32,
) -> ApiResult<YearEndReport> {
    actor.require_admin()?;

    let numbers = employees::numbers_for_year(pool, closing_year).await?;
    if numbers.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No leave records for fiscal year {closing_year}"
        )));
    }

    let mut report = YearEndReport {
        closing_year,
        processed: 0,
        rows_created: 0,
        total_carried: 0.0,
        total_expired: 0.0,
        employees: Vec::with_capacity(numbers.len()),
        skipped: Vec::new(),
    };

    for num in numbers {
        match close_employee(pool, policy, actor, &num, closing_year).await {
            Ok(done) => {
                report.processed += 1;
                report.rows_created += done.next_row_created as u32;
                report.total_carried += done.carried;
                report.total_expired += done.expired_by_age + done.expired_by_cap;
                report.employees.push(done);
            }
            Err(ApiError::BadRequest(reason)) => {
                warn!(employee_num = %num, %reason, "Skipped during year-end close");
                report.skipped.push(SkippedEmployee {
                    employee_num: num,
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
    }

    notifications::insert(
        pool,
        &NewNotification {
            user_id: None,
            kind: NotificationKind::YearEndClosed,
            title: format!("Fiscal year {closing_year} closed"),
            message: format!(
                "{} employees processed, {:.1} days carried, {:.1} days expired, {} skipped",
                report.processed,
                report.total_carried,
                report.total_expired,
                report.skipped.len()
            ),
            entity_type: Some("fiscal_year"),
            entity_id: Some(closing_year.to_string()),
        },
    )
    .await?;

    cache.invalidate(closing_year).await;
    cache.invalidate(closing_year + 1).await;
    info!(
        closing_year,
        processed = report.processed,
        created = report.rows_created,
        carried = report.total_carried,
        expired = report.total_expired,
        "Year-end close finished"
    );
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmployeeExpiring {
    #[schema(example = "E1024")]
    pub employee_num: String,
    pub name: String,
    pub haken: Option<String>,
    #[serde(flatten)]
    pub expiring: ExpiringDays,
}

fn expiring_for(
    rows: &[Employee],
    as_of: NaiveDate,
    window_days: i64,
    start_month: u32,
) -> ApiResult<Vec<EmployeeExpiring>> {
    let balances = balances_of(rows)?;
    let mut out = Vec::new();
    for exp in carryover::expiring_within(&balances, as_of, window_days, start_month)? {
        if let Some(row) = rows.iter().find(|r| r.year == exp.year) {
            out.push(EmployeeExpiring {
                employee_num: row.employee_num.clone(),
                name: row.name.clone(),
                haken: row.haken.clone(),
                expiring: exp,
            });
        }
    }
    Ok(out)
}

/// Days across all employees that lapse within `window_days` of `as_of`, soonest first.
pub async fn expiring(
    pool: &MySqlPool,
    policy: &LeavePolicy,
    as_of: NaiveDate,
    window_days: Option<i64>,
) -> ApiResult<Vec<EmployeeExpiring>> {
    let window = window_days.unwrap_or(policy.expiry_warning_days);
    let current = fiscal_year_of(as_of, policy.fiscal_year_start_month);

    // only the two youngest grant years can still be unexpired
    let mut rows = employees::for_year(pool, current - 1).await?;
    rows.extend(employees::for_year(pool, current).await?);

    let mut out = expiring_for(&rows, as_of, window, policy.fiscal_year_start_month)?;
    out.sort_by(|a, b| {
        a.expiring
            .expires_on
            .cmp(&b.expiring.expires_on)
            .then_with(|| a.employee_num.cmp(&b.employee_num))
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(num: &str, year: i32, granted: f64, used: f64) -> Employee {
        Employee {
            id: year as u64,
            employee_num: num.into(),
            year,
            name: format!("name-{num}"),
            haken: None,
            hire_date: Some(d(2015, 4, 1)),
            grant_date: None,
            granted,
            used,
            expired: 0.0,
            balance: granted - used,
            carried_over: 0.0,
            usage_rate: 0.0,
            closed_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn closing_expires_old_rows_and_caps_the_rest() {
        let mut rows = vec![row("E1", 2024, 20.0, 2.0), row("E1", 2025, 45.0, 0.0), row("E1", 2026, 20.0, 0.0)];
        let out = close_rows(&mut rows, 2025, 40.0).unwrap();

        assert_eq!(out.carried, 40.0);
        assert_eq!(out.expired_by_cap, 5.0);
        assert_eq!(rows[0].expired, 18.0);
        assert_eq!(rows[0].balance, 0.0);
        assert_eq!(rows[1].balance, 40.0);
        // next year is untouched
        assert_eq!(rows[2].balance, 20.0);
        for r in &rows {
            assert_eq!(r.balance, r.granted - r.used - r.expired);
        }
    }

    #[test]
    fn closing_twice_changes_nothing() {
        let mut rows = vec![row("E1", 2024, 20.0, 2.0), row("E1", 2025, 45.0, 0.0)];
        close_rows(&mut rows, 2025, 40.0).unwrap();
        let snapshot: Vec<(f64, f64)> = rows.iter().map(|r| (r.expired, r.balance)).collect();

        let again = close_rows(&mut rows, 2025, 40.0).unwrap();
        assert_eq!(again.total_expired(), 0.0);
        assert_eq!(again.carried, 40.0);
        let after: Vec<(f64, f64)> = rows.iter().map(|r| (r.expired, r.balance)).collect();
        assert_eq!(snapshot, after);
    }

    #[test]
    fn next_grant_comes_from_hire_date() {
        let g = next_year_grant(Some(d(2022, 4, 1)), 2026, 4).unwrap();
        // by March 2027 the employee has 4.5 years of service
        assert_eq!(g.granted, 16.0);
        assert_eq!(g.grant_date, Some(d(2026, 10, 1)));

        let none = next_year_grant(None, 2026, 4).unwrap();
        assert_eq!(none.granted, 0.0);
        let future = next_year_grant(Some(d(2028, 1, 1)), 2026, 4).unwrap();
        assert_eq!(future.granted, 0.0);
    }

    #[test]
    fn lists_days_about_to_lapse() {
        let rows = vec![row("E1", 2024, 10.0, 4.0), row("E1", 2025, 11.0, 0.0)];
        // 2024 grants lapse on 2026-04-01
        let soon = expiring_for(&rows, d(2026, 2, 1), 90, 4).unwrap();
        assert_eq!(soon.len(), 1);
        assert_eq!(soon[0].expiring.year, 2024);
        assert_eq!(soon[0].expiring.days, 6.0);
        assert_eq!(soon[0].expiring.expires_on, d(2026, 4, 1));

        assert!(expiring_for(&rows, d(2025, 10, 1), 90, 4).unwrap().is_empty());
    }
}
