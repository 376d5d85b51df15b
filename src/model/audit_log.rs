use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    Cancel,
    Revert,
    YearEnd,
    Sync,
    Reconcile,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AuditEntry {
    pub id: u64,
    pub user_id: Option<u64>,
    #[schema(example = "APPROVE")]
    pub action: String,
    #[schema(example = "leave_request")]
    pub entity_type: String,
    #[schema(example = "12")]
    pub entity_id: String,
    #[schema(value_type = Option<Object>)]
    pub old_value: Option<Json<serde_json::Value>>,
    #[schema(value_type = Option<Object>)]
    pub new_value: Option<Json<serde_json::Value>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Audit record about to be written.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub user_id: Option<u64>,
    pub action: AuditAction,
    pub entity_type: &'static str,
    pub entity_id: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
}
