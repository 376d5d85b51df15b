use sqlx::types::Json;
use sqlx::{Executor, MySql, MySqlPool};

use super::{FilterValue, Where, bind_filters};
use crate::model::audit_log::{AuditEntry, NewAuditEntry};

pub async fn insert<'c, E>(exec: E, entry: &NewAuditEntry) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query(
        r#"
        INSERT INTO audit_log (user_id, action, entity_type, entity_id, old_value, new_value)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.action.as_ref())
    .bind(entry.entity_type)
    .bind(&entry.entity_id)
    .bind(entry.old_value.as_ref().map(Json))
    .bind(entry.new_value.as_ref().map(Json))
    .execute(exec)
    .await?;
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct AuditFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: Option<u64>,
}

pub async fn list(
    pool: &MySqlPool,
    filter: &AuditFilter,
    limit: u32,
    offset: u32,
) -> Result<(Vec<AuditEntry>, i64), sqlx::Error> {
    let mut w = Where::default();
    if let Some(t) = &filter.entity_type {
        w.push("entity_type = ?", FilterValue::Str(t.clone()));
    }
    if let Some(id) = &filter.entity_id {
        w.push("entity_id = ?", FilterValue::Str(id.clone()));
    }
    if let Some(user) = filter.user_id {
        w.push("user_id = ?", FilterValue::U64(user));
    }

    let count_sql = format!("SELECT COUNT(*) FROM audit_log{}", w.sql());
    let total = bind_filters!(sqlx::query_scalar::<_, i64>(&count_sql), &w.args)
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        "SELECT id, user_id, action, entity_type, entity_id, old_value, new_value, created_at \
         FROM audit_log{} ORDER BY id DESC LIMIT ? OFFSET ?",
        w.sql()
    );
    let rows = bind_filters!(sqlx::query_as::<_, AuditEntry>(&data_sql), &w.args)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    Ok((rows, total))
}
