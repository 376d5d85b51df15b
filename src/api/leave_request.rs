use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    config::LeavePolicy,
    error::{ApiError, ApiResult},
    model::leave_request::{LeaveRequest, LeaveStatus},
    services::{
        leave::{self, CreateLeave},
        summary::SummaryCache,
    },
    store::leave_requests::{self, LeaveFilter},
    utils::db_utils::page_window,
};

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LeaveQuery {
    /// Filter by employee number (managers only; employees always see their own)
    pub employee_num: Option<String>,
    /// Fiscal year the request is charged to
    pub year: Option<i32>,
    /// PENDING, APPROVED, REJECTED, CANCELLED or REVERTED
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Submit a leave request (PENDING)
#[utoipa::path(
    post,
    path = "/api/v1/leave",
    request_body = CreateLeave,
    responses(
        (status = 201, description = "Leave request created", body = LeaveRequest),
        (status = 400, description = "Invalid dates or unit"),
        (status = 403, description = "Cannot file for another employee"),
        (status = 409, description = "Overlaps an existing request"),
        (status = 422, description = "Insufficient balance")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<LeavePolicy>,
    payload: web::Json<CreateLeave>,
) -> ApiResult<HttpResponse> {
    let created = leave::submit(pool.get_ref(), &policy, &auth, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/leave",
    params(LeaveQuery),
    responses(
        (status = 200, description = "Paginated leave requests, newest first", body = LeaveListResponse),
        (status = 400, description = "Unknown status")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    let (page, per_page, offset) = page_window(query.page, query.per_page, 10);

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<LeaveStatus>()
                .map_err(|_| ApiError::BadRequest(format!("Unknown leave status {s:?}")))
        })
        .transpose()?;

    let employee_num = if auth.is_manager() {
        query.employee_num.filter(|n| !n.trim().is_empty())
    } else {
        Some(auth.own_employee_num()?.to_string())
    };

    let filter = LeaveFilter {
        employee_num,
        year: query.year,
        status,
    };
    debug!(?filter, page, per_page, "Listing leave requests");

    let (data, total) = leave_requests::list(pool.get_ref(), &filter, per_page, offset).await?;
    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/leave/{leave_id}",
    params(("leave_id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request", body = LeaveRequest),
        (status = 403, description = "Not your request"),
        (status = 404, description = "Not found")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let leave = leave_requests::find(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request"))?;
    auth.require_access_to(&leave.employee_num)?;
    Ok(HttpResponse::Ok().json(leave))
}

/// Approve a pending request and deduct its days
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/approve",
    params(("leave_id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Approved, with the per-year deductions", body = LeaveRequest),
        (status = 403, description = "Manager only"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Not pending"),
        (status = 422, description = "Insufficient balance")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<LeavePolicy>,
    cache: web::Data<SummaryCache>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let approved = leave::approve(pool.get_ref(), &policy, &cache, &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(approved))
}

#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/reject",
    params(("leave_id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Rejected", body = LeaveRequest),
        (status = 403, description = "Manager only"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Not pending")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let rejected = leave::reject(pool.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rejected))
}

/// Withdraw a pending request
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/cancel",
    params(("leave_id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Cancelled", body = LeaveRequest),
        (status = 403, description = "Only the requester or a manager"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Not pending")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn cancel_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let cancelled = leave::cancel(pool.get_ref(), &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(cancelled))
}

/// Undo an approval and give the deducted days back to the years they came from
#[utoipa::path(
    put,
    path = "/api/v1/leave/{leave_id}/revert",
    params(("leave_id", Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Reverted", body = LeaveRequest),
        (status = 403, description = "Manager only"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Not approved")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn revert_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<LeavePolicy>,
    cache: web::Data<SummaryCache>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let reverted = leave::revert(pool.get_ref(), &policy, &cache, &auth, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reverted))
}
