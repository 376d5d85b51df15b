use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::role::Role,
    store::users,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRole {
    #[schema(example = "Manager")]
    pub role: Role,
    /// Links the account to an employee's records; the current link is kept when omitted.
    #[schema(example = "E1024", nullable = true)]
    pub employee_num: Option<String>,
}

/// Change a user's role and employee link
#[utoipa::path(
    put,
    path = "/api/v1/users/{user_id}/role",
    params(("user_id", Path, description = "User ID")),
    request_body = SetRole,
    responses(
        (status = 200, description = "Role updated", body = Object, example = json!({"user_id": 3, "role": "Manager"})),
        (status = 400, description = "Admins cannot change their own role"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn set_role(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<SetRole>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let user_id = path.into_inner();
    if user_id == auth.user_id {
        return Err(ApiError::BadRequest("Admins cannot change their own role".into()));
    }

    let employee_num = payload
        .employee_num
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    if !users::set_role(pool.get_ref(), user_id, payload.role.id(), employee_num).await? {
        return Err(ApiError::not_found("User"));
    }

    info!(admin = auth.user_id, user_id, role = ?payload.role, "Role changed");
    Ok(HttpResponse::Ok().json(json!({ "user_id": user_id, "role": payload.role })))
}
