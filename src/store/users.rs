use sqlx::{Executor, MySql, MySqlPool};

use crate::model::user::User;

const COLUMNS: &str = "id, username, password, role_id, employee_num, is_active";

pub async fn find_by_username(pool: &MySqlPool, username: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE username = ?"))
        .bind(username)
        .fetch_optional(pool)
        .await
}

pub async fn find(pool: &MySqlPool, id: u64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(&format!("SELECT {COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn count<'c, E>(exec: E) -> Result<i64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(exec)
        .await
}

pub async fn insert<'c, E>(
    exec: E,
    username: &str,
    password_hash: &str,
    role_id: u8,
    employee_num: Option<&str>,
) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let result = sqlx::query(
        "INSERT INTO users (username, password, role_id, employee_num) VALUES (?, ?, ?, ?)",
    )
    .bind(username)
    .bind(password_hash)
    .bind(role_id)
    .bind(employee_num)
    .execute(exec)
    .await?;
    Ok(result.last_insert_id())
}

pub async fn set_role(
    pool: &MySqlPool,
    id: u64,
    role_id: u8,
    employee_num: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET role_id = ?, employee_num = COALESCE(?, employee_num) WHERE id = ?")
        .bind(role_id)
        .bind(employee_num)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn touch_login(pool: &MySqlPool, id: u64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
pub struct RefreshRecord {
    pub id: u64,
    pub user_id: u64,
    pub revoked: bool,
}

pub async fn store_refresh<'c, E>(exec: E, user_id: u64, jti: &str, expires_at: usize) -> Result<(), sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query("INSERT INTO refresh_tokens (user_id, jti, expires_at) VALUES (?, ?, FROM_UNIXTIME(?))")
        .bind(user_id)
        .bind(jti)
        .bind(expires_at as i64)
        .execute(exec)
        .await?;
    Ok(())
}

/// Locks the token row so two concurrent refreshes cannot both rotate it.
pub async fn lock_refresh<'c, E>(exec: E, jti: &str) -> Result<Option<RefreshRecord>, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    sqlx::query_as::<_, RefreshRecord>("SELECT id, user_id, revoked FROM refresh_tokens WHERE jti = ? FOR UPDATE")
        .bind(jti)
        .fetch_optional(exec)
        .await
}

pub async fn revoke_refresh<'c, E>(exec: E, jti: &str) -> Result<u64, sqlx::Error>
where
    E: Executor<'c, Database = MySql>,
{
    let result = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE")
        .bind(jti)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}
