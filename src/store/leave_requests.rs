use chrono::NaiveDate;
use sqlx::types::Json;
use sqlx::{Executor, MySql, MySqlConnection, MySqlPool};

use super::{FilterValue, Where, bind_filters};
use crate::fiscal::Allocation;
use crate::model::leave_request::{LeaveRequest, LeaveRequestRow, LeaveStatus, LeaveType, LeaveUnit};

const COLUMNS: &str = "id, employee_num, year, start_date, end_date, unit, hours, days_requested, \
                       leave_type, reason, status, requested_by, approver, decided_at, deductions, \
                       created_at, updated_at";

#[derive(Debug, Clone)]
pub struct NewLeaveRequest {
    pub employee_num: String,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub unit: LeaveUnit,
    pub hours: Option<f64>,
    pub days_requested: f64,
    pub leave_type: LeaveType,
    pub reason: Option<String>,
    pub requested_by: u64,
}

#[derive(Debug, Default, Clone)]
pub struct LeaveFilter {
    pub employee_num: Option<String>,
    pub year: Option<i32>,
    pub status: Option<LeaveStatus>,
}

fn decode(row: LeaveRequestRow) -> Result<LeaveRequest, sqlx::Error> {
    LeaveRequest::try_from(row).map_err(|e| sqlx::Error::Decode(e.into()))
}

pub async fn insert<'c, E>(exec: E, new: &NewLeaveRequest) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (employee_num, year, start_date, end_date, unit, hours, days_requested,
             leave_type, reason, status, requested_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&new.employee_num)
    .bind(new.year)
    .bind(new.start_date)
    .bind(new.end_date)
    .bind(new.unit.as_ref())
    .bind(new.hours)
    .bind(new.days_requested)
    .bind(new.leave_type.as_ref())
    .bind(&new.reason)
    .bind(LeaveStatus::Pending.as_ref())
    .bind(new.requested_by)
    .execute(exec)
    .await?;
    Ok(result.last_insert_id())
}

pub async fn find<'c, E>(exec: E, id: u64) -> Result<Option<LeaveRequest>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_as::<_, LeaveRequestRow>(&format!("SELECT {COLUMNS} FROM leave_requests WHERE id = ?"))
        .bind(id)
        .fetch_optional(exec)
        .await?
        .map(decode)
        .transpose()
}

/// Loads and locks a request for a status change.
pub async fn lock(conn: &mut MySqlConnection, id: u64) -> Result<Option<LeaveRequest>, sqlx::Error> {
    sqlx::query_as::<_, LeaveRequestRow>(&format!(
        "SELECT {COLUMNS} FROM leave_requests WHERE id = ? FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .map(decode)
    .transpose()
}

pub async fn list(
    pool: &MySqlPool,
    filter: &LeaveFilter,
    limit: u32,
    offset: u32,
) -> Result<(Vec<LeaveRequest>, i64), sqlx::Error> {
    let mut w = Where::default();
    if let Some(num) = &filter.employee_num {
        w.push("employee_num = ?", FilterValue::Str(num.clone()));
    }
    if let Some(year) = filter.year {
        w.push("year = ?", FilterValue::I32(year));
    }
    if let Some(status) = filter.status {
        w.push("status = ?", FilterValue::Str(status.to_string()));
    }

    let count_sql = format!("SELECT COUNT(*) FROM leave_requests{}", w.sql());
    let total = bind_filters!(sqlx::query_scalar::<_, i64>(&count_sql), &w.args)
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        "SELECT {COLUMNS} FROM leave_requests{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        w.sql()
    );
    let rows = bind_filters!(sqlx::query_as::<_, LeaveRequestRow>(&data_sql), &w.args)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let requests = rows.into_iter().map(decode).collect::<Result<Vec<_>, _>>()?;
    Ok((requests, total))
}

/// Moves a request from `from` to `to`. Returns false if it was no longer in `from`.
pub async fn transition<'c, E>(
    exec: E,
    id: u64,
    from: LeaveStatus,
    to: LeaveStatus,
    actor: u64,
    deductions: Option<&[Allocation]>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?, approver = ?, decided_at = CURRENT_TIMESTAMP,
            deductions = COALESCE(?, deductions)
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(to.as_ref())
    .bind(actor)
    .bind(deductions.map(Json))
    .bind(id)
    .bind(from.as_ref())
    .execute(exec)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Days already requested but not yet decided, per (employee, year).
pub async fn pending_days<'c, E>(exec: E, employee_num: &str) -> Result<f64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let total: Option<f64> = sqlx::query_scalar(
        "SELECT SUM(days_requested) FROM leave_requests \
         WHERE employee_num = ? AND status = 'PENDING' AND leave_type = 'PAID'",
    )
    .bind(employee_num)
    .fetch_one(exec)
    .await?;
    Ok(total.unwrap_or(0.0))
}
