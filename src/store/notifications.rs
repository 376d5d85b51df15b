use sqlx::{Executor, MySql, MySqlPool};

use super::{FilterValue, Where, bind_filters};
use crate::model::notification::{NewNotification, Notification};

pub async fn insert<'c, E>(exec: E, n: &NewNotification) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, title, message, entity_type, entity_id)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(n.user_id)
    .bind(n.kind.as_ref())
    .bind(&n.title)
    .bind(&n.message)
    .bind(n.entity_type)
    .bind(&n.entity_id)
    .execute(exec)
    .await?;
    Ok(result.last_insert_id())
}

/// Notifications visible to a user. Managers also see broadcasts (no recipient).
pub async fn list_for(
    pool: &MySqlPool,
    user_id: u64,
    include_broadcast: bool,
    unread_only: bool,
    limit: u32,
    offset: u32,
) -> Result<(Vec<Notification>, i64), sqlx::Error> {
    let mut w = Where::default();
    if include_broadcast {
        w.push("(user_id = ? OR user_id IS NULL)", FilterValue::U64(user_id));
    } else {
        w.push("user_id = ?", FilterValue::U64(user_id));
    }
    if unread_only {
        w.push("is_read = ?", FilterValue::Bool(false));
    }

    let count_sql = format!("SELECT COUNT(*) FROM notifications{}", w.sql());
    let total = bind_filters!(sqlx::query_scalar::<_, i64>(&count_sql), &w.args)
        .fetch_one(pool)
        .await?;

    let data_sql = format!(
        "SELECT id, user_id, kind, title, message, entity_type, entity_id, is_read, created_at \
         FROM notifications{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        w.sql()
    );
    let rows = bind_filters!(sqlx::query_as::<_, Notification>(&data_sql), &w.args)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    Ok((rows, total))
}

pub async fn mark_read(
    pool: &MySqlPool,
    id: u64,
    user_id: u64,
    include_broadcast: bool,
) -> Result<bool, sqlx::Error> {
    let sql = if include_broadcast {
        "UPDATE notifications SET is_read = TRUE WHERE id = ? AND (user_id = ? OR user_id IS NULL)"
    } else {
        "UPDATE notifications SET is_read = TRUE WHERE id = ? AND user_id = ?"
    };
    let result = sqlx::query(sql).bind(id).bind(user_id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_all_read(pool: &MySqlPool, user_id: u64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = ? AND is_read = FALSE")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
