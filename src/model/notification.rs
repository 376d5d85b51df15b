use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    LeaveRequested,
    LeaveApproved,
    LeaveRejected,
    LeaveCancelled,
    LeaveReverted,
    ComplianceAlert,
    ExpiryWarning,
    YearEndClosed,
    SyncCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Notification {
    pub id: u64,
    /// Recipient; broadcast to managers when empty.
    pub user_id: Option<u64>,
    #[schema(example = "LEAVE_APPROVED")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub is_read: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// Notification about to be written.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Option<u64>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub entity_type: Option<&'static str>,
    pub entity_id: Option<String>,
}
