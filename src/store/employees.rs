use chrono::NaiveDate;
use sqlx::{Executor, MySql, MySqlConnection, MySqlPool};

use super::{FilterValue, Where, bind_filters};
use crate::model::employee::Employee;

const COLUMNS: &str = "id, employee_num, year, name, haken, hire_date, grant_date, granted, used, \
                       expired, balance, carried_over, usage_rate, closed_at, updated_at";

#[derive(Debug, Default, Clone)]
pub struct EmployeeFilter {
    pub year: Option<i32>,
    pub haken: Option<String>,
    /// Matches name or employee number.
    pub search: Option<String>,
}

impl EmployeeFilter {
    fn to_where(&self) -> Where {
        let mut w = Where::default();
        if let Some(year) = self.year {
            w.push("year = ?", FilterValue::I32(year));
        }
        if let Some(haken) = &self.haken {
            w.push("haken = ?", FilterValue::Str(haken.clone()));
        }
        if let Some(search) = &self.search {
            let like = format!("%{}%", search.trim());
            w.push_many(
                "(name LIKE ? OR employee_num LIKE ?)",
                [FilterValue::Str(like.clone()), FilterValue::Str(like)],
            );
        }
        w
    }
}

/// Fields for a brand-new leave row.
#[derive(Debug, Clone)]
pub struct NewEmployee {
    pub employee_num: String,
    pub year: i32,
    pub name: String,
    pub haken: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub grant_date: Option<NaiveDate>,
    pub granted: f64,
    pub used: f64,
    pub expired: f64,
    pub carried_over: f64,
}

impl NewEmployee {
    pub fn balance(&self) -> f64 {
        self.granted - self.used - self.expired
    }
}

pub async fn list(
    pool: &MySqlPool,
    filter: &EmployeeFilter,
    limit: u32,
    offset: u32,
) -> Result<(Vec<Employee>, i64), sqlx::Error> {
    let w = filter.to_where();

    let count_sql = format!("SELECT COUNT(*) FROM employees{}", w.sql());
    tracing::debug!(sql = %count_sql, "Counting employees");
    let total = bind_filters!(sqlx::query_scalar::<_, i64>(&count_sql), &w.args)
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        "SELECT {COLUMNS} FROM employees{} ORDER BY year DESC, employee_num LIMIT ? OFFSET ?",
        w.sql()
    );
    let rows = bind_filters!(sqlx::query_as::<_, Employee>(&data_sql), &w.args)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok((rows, total))
}

pub async fn find<'c, E>(exec: E, employee_num: &str, year: i32) -> Result<Option<Employee>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {COLUMNS} FROM employees WHERE employee_num = ? AND year = ?"
    ))
    .bind(employee_num)
    .bind(year)
    .fetch_optional(exec)
    .await
}

/// Every year row of one employee, oldest first.
pub async fn history<'c, E>(exec: E, employee_num: &str) -> Result<Vec<Employee>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {COLUMNS} FROM employees WHERE employee_num = ? ORDER BY year"
    ))
    .bind(employee_num)
    .fetch_all(exec)
    .await
}

/// Locks and returns one employee's rows for years up to and including `max_year`.
pub async fn lock_history(
    conn: &mut MySqlConnection,
    employee_num: &str,
    max_year: i32,
) -> Result<Vec<Employee>, sqlx::Error> {
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {COLUMNS} FROM employees WHERE employee_num = ? AND year <= ? ORDER BY year FOR UPDATE"
    ))
    .bind(employee_num)
    .bind(max_year)
    .fetch_all(conn)
    .await
}

pub async fn for_year<'c, E>(exec: E, year: i32) -> Result<Vec<Employee>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {COLUMNS} FROM employees WHERE year = ? ORDER BY employee_num"
    ))
    .bind(year)
    .fetch_all(exec)
    .await
}

/// Employee numbers holding a row for `year`.
pub async fn numbers_for_year<'c, E>(exec: E, year: i32) -> Result<Vec<String>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_scalar::<_, String>("SELECT employee_num FROM employees WHERE year = ? ORDER BY employee_num")
        .bind(year)
        .fetch_all(exec)
        .await
}

pub async fn insert<'c, E>(exec: E, new: &NewEmployee) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO employees
            (employee_num, year, name, haken, hire_date, grant_date,
             granted, used, expired, balance, carried_over, usage_rate)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&new.employee_num)
    .bind(new.year)
    .bind(&new.name)
    .bind(&new.haken)
    .bind(new.hire_date)
    .bind(new.grant_date)
    .bind(new.granted)
    .bind(new.used)
    .bind(new.expired)
    .bind(new.balance())
    .bind(new.carried_over)
    .bind(crate::fiscal::balance::usage_rate(new.granted, new.used))
    .execute(exec)
    .await?;
    Ok(result.last_insert_id())
}

/// Outcome of an upsert keyed on (employee_num, year).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
    Unchanged,
}

pub async fn upsert<'c, E>(exec: E, new: &NewEmployee) -> Result<Upserted, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO employees
            (employee_num, year, name, haken, hire_date, grant_date,
             granted, used, expired, balance, carried_over, usage_rate)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            name = VALUES(name),
            haken = VALUES(haken),
            hire_date = VALUES(hire_date),
            grant_date = VALUES(grant_date),
            granted = VALUES(granted),
            used = VALUES(used),
            expired = VALUES(expired),
            balance = VALUES(balance),
            carried_over = VALUES(carried_over),
            usage_rate = VALUES(usage_rate)
        "#,
    )
    .bind(&new.employee_num)
    .bind(new.year)
    .bind(&new.name)
    .bind(&new.haken)
    .bind(new.hire_date)
    .bind(new.grant_date)
    .bind(new.granted)
    .bind(new.used)
    .bind(new.expired)
    .bind(new.balance())
    .bind(new.carried_over)
    .bind(crate::fiscal::balance::usage_rate(new.granted, new.used))
    .execute(exec)
    .await?;

    // MySQL reports 1 for an insert, 2 for a changed row, 0 for an identical one
    Ok(match result.rows_affected() {
        1 => Upserted::Inserted,
        0 => Upserted::Unchanged,
        _ => Upserted::Updated,
    })
}

/// Persists the engine-owned columns of a row.
pub async fn save_balances<'c, E>(exec: E, row: &Employee) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query(
        r#"
        UPDATE employees
        SET used = ?, expired = ?, balance = ?, carried_over = ?, usage_rate = ?
        WHERE id = ?
        "#,
    )
    .bind(row.used)
    .bind(row.expired)
    .bind(row.balance)
    .bind(row.carried_over)
    .bind(row.usage_rate)
    .bind(row.id)
    .execute(exec)
    .await?;
    Ok(())
}

/// Records that the year-end close of `year` ran; the first timestamp is kept.
pub async fn mark_closed<'c, E>(exec: E, employee_num: &str, year: i32) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query(
        "UPDATE employees SET closed_at = COALESCE(closed_at, CURRENT_TIMESTAMP) \
         WHERE employee_num = ? AND year = ?",
    )
    .bind(employee_num)
    .bind(year)
    .execute(exec)
    .await?;
    Ok(())
}

pub async fn delete<'c, E>(exec: E, employee_num: &str, year: i32) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let result = sqlx::query("DELETE FROM employees WHERE employee_num = ? AND year = ?")
        .bind(employee_num)
        .bind(year)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

/// Distinct dispatch destinations, for filter dropdowns.
pub async fn haken_list(pool: &MySqlPool, year: i32) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT haken FROM employees WHERE year = ? AND haken IS NOT NULL ORDER BY haken",
    )
    .bind(year)
    .fetch_all(pool)
    .await
}

/// Fiscal years that have at least one row, newest first.
pub async fn years(pool: &MySqlPool) -> Result<Vec<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT DISTINCT year FROM employees ORDER BY year DESC")
        .fetch_all(pool)
        .await
}
