use chrono::NaiveDate;
use sqlx::{Executor, MySql, MySqlPool};

use super::{FilterValue, Where, bind_filters};
use crate::model::registry::{RegistryCategory, RegistryEmployee};

#[derive(Debug, Clone, PartialEq)]
pub struct NewRegistryEmployee {
    pub employee_num: String,
    pub name: String,
    pub kana: Option<String>,
    pub haken: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub leave_date: Option<NaiveDate>,
    pub status: String,
    pub hourly_wage: Option<f64>,
}

pub async fn upsert<'c, E>(
    exec: E,
    category: RegistryCategory,
    rec: &NewRegistryEmployee,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let sql = format!(
        r#"
        INSERT INTO {} (employee_num, name, kana, haken, hire_date, leave_date, status, hourly_wage)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            name = VALUES(name),
            kana = VALUES(kana),
            haken = VALUES(haken),
            hire_date = VALUES(hire_date),
            leave_date = VALUES(leave_date),
            status = VALUES(status),
            hourly_wage = VALUES(hourly_wage)
        "#,
        category.table()
    );
    let result = sqlx::query(&sql)
        .bind(&rec.employee_num)
        .bind(&rec.name)
        .bind(&rec.kana)
        .bind(&rec.haken)
        .bind(rec.hire_date)
        .bind(rec.leave_date)
        .bind(&rec.status)
        .bind(rec.hourly_wage)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

pub async fn list(
    pool: &MySqlPool,
    category: RegistryCategory,
    status: Option<&str>,
    search: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<(Vec<RegistryEmployee>, i64), sqlx::Error> {
    let mut w = Where::default();
    if let Some(status) = status {
        w.push("status = ?", FilterValue::Str(status.to_string()));
    }
    if let Some(search) = search {
        let like = format!("%{}%", search.trim());
        w.push_many(
            "(name LIKE ? OR kana LIKE ? OR employee_num LIKE ?)",
            [
                FilterValue::Str(like.clone()),
                FilterValue::Str(like.clone()),
                FilterValue::Str(like),
            ],
        );
    }

    let table = category.table();
    let count_sql = format!("SELECT COUNT(*) FROM {table}{}", w.sql());
    let total = bind_filters!(sqlx::query_scalar::<_, i64>(&count_sql), &w.args)
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        "SELECT id, employee_num, name, kana, haken, hire_date, leave_date, status, hourly_wage, updated_at \
         FROM {table}{} ORDER BY employee_num LIMIT ? OFFSET ?",
        w.sql()
    );
    let rows = bind_filters!(sqlx::query_as::<_, RegistryEmployee>(&data_sql), &w.args)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    Ok((rows, total))
}

/// Hire date on record in any registry, used when a ledger row lacks one.
pub async fn hire_date_of<'c, E>(exec: E, employee_num: &str) -> Result<Option<NaiveDate>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let found: Option<Option<NaiveDate>> = sqlx::query_scalar(
        r#"
        SELECT hire_date FROM genzai WHERE employee_num = ?
        UNION ALL SELECT hire_date FROM ukeoi WHERE employee_num = ?
        UNION ALL SELECT hire_date FROM staff WHERE employee_num = ?
        LIMIT 1
        "#,
    )
    .bind(employee_num)
    .bind(employee_num)
    .bind(employee_num)
    .fetch_optional(exec)
    .await?;
    Ok(found.flatten())
}
