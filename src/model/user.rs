use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role_id: u8,
    /// Linked leave record, if the account belongs to an employee.
    pub employee_num: Option<String>,
    pub is_active: bool,
}
