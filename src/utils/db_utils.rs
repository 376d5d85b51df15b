use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{Executor, MySql};

use crate::error::ApiError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    F64(f64),
    Date(NaiveDate),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug, PartialEq)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Column a JSON patch may touch, and how its value must look.
#[derive(Debug, Clone, Copy)]
pub enum ColumnKind {
    Text,
    Date,
    Number,
}

/// ===============================
/// Build dynamic UPDATE SQL from a JSON patch
/// ===============================
///
/// Only `allowed` columns are accepted, so column names never come from the client
/// verbatim. Keys are emitted in the order of `allowed` to keep statements stable.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[(&'static str, ColumnKind)],
    key: &[(&'static str, SqlValue)],
) -> Result<SqlUpdate, ApiError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::BadRequest("Payload must be a JSON object".into()))?;

    if obj.is_empty() {
        return Err(ApiError::BadRequest("No fields provided for update".into()));
    }

    if let Some(unknown) = obj
        .keys()
        .find(|k| !allowed.iter().any(|(col, _)| *col == k.as_str()))
    {
        return Err(ApiError::BadRequest(format!("Field '{unknown}' cannot be updated")));
    }

    let mut sets = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + key.len());

    for (column, kind) in allowed {
        let Some(value) = obj.get(*column) else {
            continue;
        };
        sets.push(format!("{column} = ?"));
        values.push(convert(column, *kind, value)?);
    }

    let where_clause = key
        .iter()
        .map(|(col, _)| format!("{col} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ");
    values.extend(key.iter().map(|(_, v)| v.clone()));

    Ok(SqlUpdate {
        sql: format!("UPDATE {table} SET {} WHERE {where_clause}", sets.join(", ")),
        values,
    })
}

fn convert(column: &str, kind: ColumnKind, value: &Value) -> Result<SqlValue, ApiError> {
    let bad = || ApiError::BadRequest(format!("Invalid value for '{column}'"));
    match (kind, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (ColumnKind::Text, Value::String(s)) => Ok(SqlValue::String(s.trim().to_string())),
        (ColumnKind::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(SqlValue::Date)
            .map_err(|_| bad()),
        (ColumnKind::Number, Value::Number(n)) => n
            .as_i64()
            .map(SqlValue::I64)
            .or_else(|| n.as_f64().map(SqlValue::F64))
            .ok_or_else(bad),
        _ => Err(bad()),
    }
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'c, E>(exec: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(exec).await?;
    Ok(result.rows_affected())
}

/// Page number, page size and row offset from optional query parameters.
pub fn page_window(page: Option<u32>, per_page: Option<u32>, default_per_page: u32) -> (u32, u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_per_page).clamp(1, 100);
    (page, per_page, (page - 1) * per_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[(&str, ColumnKind)] = &[
        ("name", ColumnKind::Text),
        ("haken", ColumnKind::Text),
        ("hire_date", ColumnKind::Date),
    ];

    fn key() -> Vec<(&'static str, SqlValue)> {
        vec![
            ("employee_num", SqlValue::String("E1".into())),
            ("year", SqlValue::I64(2025)),
        ]
    }

    #[test]
    fn builds_statement_in_column_order() {
        let update = build_update_sql(
            "employees",
            &json!({"hire_date": "2021-04-01", "name": " Sato "}),
            COLUMNS,
            &key(),
        )
        .unwrap();
        assert_eq!(
            update.sql,
            "UPDATE employees SET name = ?, hire_date = ? WHERE employee_num = ? AND year = ?"
        );
        assert_eq!(update.values[0], SqlValue::String("Sato".into()));
        assert_eq!(
            update.values[1],
            SqlValue::Date(NaiveDate::from_ymd_opt(2021, 4, 1).unwrap())
        );
        assert_eq!(update.values.len(), 4);
    }

    #[test]
    fn rejects_columns_outside_the_allow_list() {
        let err = build_update_sql("employees", &json!({"balance": 40}), COLUMNS, &key()).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn rejects_malformed_dates_and_empty_patches() {
        assert!(build_update_sql("employees", &json!({"hire_date": "April"}), COLUMNS, &key()).is_err());
        assert!(build_update_sql("employees", &json!({}), COLUMNS, &key()).is_err());
        assert!(build_update_sql("employees", &json!([1]), COLUMNS, &key()).is_err());
    }

    #[test]
    fn page_window_clamps() {
        assert_eq!(page_window(None, None, 20), (1, 20, 0));
        assert_eq!(page_window(Some(3), Some(500), 20), (3, 100, 200));
        assert_eq!(page_window(Some(0), Some(0), 20), (1, 1, 0));
    }
}
