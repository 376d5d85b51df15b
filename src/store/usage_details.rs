use chrono::NaiveDate;
use sqlx::{Executor, MySql, MySqlConnection};

use crate::model::usage_detail::{ChargedDay, UsageDetail, UsageTotals};

pub async fn list<'c, E>(exec: E, employee_num: &str, year: i32) -> Result<Vec<UsageDetail>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_as::<_, UsageDetail>(
        r#"
        SELECT id, employee_num, year, grant_year, use_date, days_used, leave_request_id
        FROM yukyu_usage_details
        WHERE employee_num = ? AND year = ?
        ORDER BY use_date
        "#,
    )
    .bind(employee_num)
    .bind(year)
    .fetch_all(exec)
    .await
}

/// Days drawn from the grant of `grant_year`, `None` when no usage row points at it.
pub async fn consumed<'c, E>(exec: E, employee_num: &str, grant_year: i32) -> Result<Option<f64>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_scalar::<_, Option<f64>>(
        "SELECT SUM(days_used) FROM yukyu_usage_details WHERE employee_num = ? AND grant_year = ?",
    )
    .bind(employee_num)
    .bind(grant_year)
    .fetch_one(exec)
    .await
}

const TOTALS: &str = r#"
    SELECT employee_num,
           COALESCE(SUM(CASE WHEN year = ? THEN days_used ELSE 0 END), 0) AS taken,
           COALESCE(SUM(CASE WHEN grant_year = ? THEN days_used ELSE 0 END), 0) AS consumed
    FROM yukyu_usage_details
"#;

/// Per-employee totals for everyone with usage rows dated in, or drawn from, `year`.
pub async fn totals_for_year<'c, E>(exec: E, year: i32) -> Result<Vec<UsageTotals>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_as::<_, UsageTotals>(&format!(
        "{TOTALS} WHERE year = ? OR grant_year = ? GROUP BY employee_num"
    ))
    .bind(year)
    .bind(year)
    .bind(year)
    .bind(year)
    .fetch_all(exec)
    .await
}

pub async fn totals_for<'c, E>(exec: E, employee_num: &str, year: i32) -> Result<Option<UsageTotals>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_as::<_, UsageTotals>(&format!(
        "{TOTALS} WHERE employee_num = ? AND (year = ? OR grant_year = ?) GROUP BY employee_num"
    ))
    .bind(year)
    .bind(year)
    .bind(employee_num)
    .bind(year)
    .bind(year)
    .fetch_optional(exec)
    .await
}

/// Records the days of an approved request, dated in fiscal year `year`.
pub async fn insert_for_request(
    conn: &mut MySqlConnection,
    employee_num: &str,
    year: i32,
    leave_request_id: u64,
    days: &[ChargedDay],
) -> Result<(), sqlx::Error> {
    for day in days {
        sqlx::query(
            r#"
            INSERT INTO yukyu_usage_details
                (employee_num, year, grant_year, use_date, days_used, leave_request_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(employee_num)
        .bind(year)
        .bind(day.grant_year)
        .bind(day.use_date)
        .bind(day.days_used)
        .bind(leave_request_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn delete_for_request<'c, E>(exec: E, leave_request_id: u64) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let result = sqlx::query("DELETE FROM yukyu_usage_details WHERE leave_request_id = ?")
        .bind(leave_request_id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

/// Swaps the ledger-imported days of one employee-year for `days`.
/// Imported days count against that year's own grant. Days that came from
/// approved requests are kept.
pub async fn replace_imported(
    conn: &mut MySqlConnection,
    employee_num: &str,
    year: i32,
    days: &[(NaiveDate, f64)],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "DELETE FROM yukyu_usage_details \
         WHERE employee_num = ? AND year = ? AND leave_request_id IS NULL",
    )
    .bind(employee_num)
    .bind(year)
    .execute(&mut *conn)
    .await?;

    for (date, used) in days {
        sqlx::query(
            "INSERT INTO yukyu_usage_details (employee_num, year, grant_year, use_date, days_used) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(employee_num)
        .bind(year)
        .bind(year)
        .bind(date)
        .bind(used)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
