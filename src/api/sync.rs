use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::IntoParams;

use crate::{
    auth::auth::AuthUser,
    config::LeavePolicy,
    error::{ApiError, ApiResult},
    services::{
        summary::SummaryCache,
        sync::{self, RegistrySyncReport, SyncReport},
    },
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct LedgerQuery {
    /// Sheet holding the leave ledger; `作業者データ　有給` when omitted
    pub sheet: Option<String>,
}

fn body_bytes(body: web::Bytes) -> ApiResult<Vec<u8>> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Request body must be an .xlsx or .xlsm workbook".into()));
    }
    Ok(body.to_vec())
}

/// Import the leave ledger workbook (raw .xlsx/.xlsm bytes)
#[utoipa::path(
    post,
    path = "/api/v1/sync/ledger",
    params(LedgerQuery),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Import report; problem rows are listed, not fatal", body = SyncReport),
        (status = 400, description = "Unreadable workbook or missing sheet"),
        (status = 403, description = "Manager only")
    ),
    tag = "Sync",
    security(("bearer_auth" = []))
)]
pub async fn sync_ledger(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<LeavePolicy>,
    cache: web::Data<SummaryCache>,
    query: web::Query<LedgerQuery>,
    body: web::Bytes,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let bytes = body_bytes(body)?;
    let sheet = query.into_inner().sheet.filter(|s| !s.trim().is_empty());
    let report = sync::sync_ledger(pool.get_ref(), &policy, &cache, &auth, bytes, sheet).await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Import the employee registry workbook (DBGenzaiX, DBUkeoiX, DBStaffX)
#[utoipa::path(
    post,
    path = "/api/v1/sync/registry",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Import report per registry sheet", body = RegistrySyncReport),
        (status = 400, description = "Unreadable workbook or no registry sheets"),
        (status = 403, description = "Manager only")
    ),
    tag = "Sync",
    security(("bearer_auth" = []))
)]
pub async fn sync_registry(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Bytes,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let report = sync::sync_registry(pool.get_ref(), &auth, body_bytes(body)?).await?;
    Ok(HttpResponse::Ok().json(report))
}
