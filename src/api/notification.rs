use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::notification::Notification,
    store::notifications,
    utils::db_utils::page_window,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct NotificationQuery {
    /// Only unread notifications
    #[serde(default)]
    pub unread: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub data: Vec<Notification>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 4)]
    pub total: i64,
}

/// Notifications for the caller; managers also see broadcasts
#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    params(NotificationQuery),
    responses((status = 200, description = "Notifications, newest first", body = NotificationListResponse)),
    tag = "Notification",
    security(("bearer_auth" = []))
)]
pub async fn list_notifications(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<NotificationQuery>,
) -> ApiResult<HttpResponse> {
    let (page, per_page, offset) = page_window(query.page, query.per_page, 20);
    let (data, total) = notifications::list_for(
        pool.get_ref(),
        auth.user_id,
        auth.is_manager(),
        query.unread,
        per_page,
        offset,
    )
    .await?;
    Ok(HttpResponse::Ok().json(NotificationListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/notifications/{id}/read",
    params(("id", Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 404, description = "Not found or not yours")
    ),
    tag = "Notification",
    security(("bearer_auth" = []))
)]
pub async fn mark_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    if !notifications::mark_read(pool.get_ref(), path.into_inner(), auth.user_id, auth.is_manager()).await? {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(HttpResponse::NoContent().finish())
}

/// Mark every notification addressed to the caller as read
#[utoipa::path(
    put,
    path = "/api/v1/notifications/read-all",
    responses((status = 200, description = "Count marked", body = Object, example = json!({"updated": 3}))),
    tag = "Notification",
    security(("bearer_auth" = []))
)]
pub async fn mark_all_read(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let updated = notifications::mark_all_read(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "updated": updated })))
}
