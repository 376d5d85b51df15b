use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::ApiResult,
    model::audit_log::AuditEntry,
    store::audit_log::{self, AuditFilter},
    utils::db_utils::page_window,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditQuery {
    /// employee, leave_request, ledger or registry
    pub entity_type: Option<String>,
    /// e.g. `E1024/2025` for an employee year, or a leave request id
    pub entity_id: Option<String>,
    pub user_id: Option<u64>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AuditListResponse {
    pub data: Vec<AuditEntry>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 50)]
    pub per_page: u32,
    #[schema(example = 120)]
    pub total: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries, newest first", body = AuditListResponse),
        (status = 403, description = "Manager only")
    ),
    tag = "Audit",
    security(("bearer_auth" = []))
)]
pub async fn list_audit(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AuditQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let query = query.into_inner();
    let (page, per_page, offset) = page_window(query.page, query.per_page, 50);

    let filter = AuditFilter {
        entity_type: query.entity_type.filter(|s| !s.trim().is_empty()),
        entity_id: query.entity_id.filter(|s| !s.trim().is_empty()),
        user_id: query.user_id,
    };
    let (data, total) = audit_log::list(pool.get_ref(), &filter, per_page, offset).await?;
    Ok(HttpResponse::Ok().json(AuditListResponse {
        data,
        page,
        per_page,
        total,
    }))
}
