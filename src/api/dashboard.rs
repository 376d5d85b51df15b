use actix_web::{HttpResponse, web};
use sqlx::MySqlPool;

use crate::{
    auth::auth::AuthUser,
    error::ApiResult,
    services::summary::{SummaryCache, YearSummary},
};

/// Totals, compliance tally, at-risk list, top users and per-haken usage for a year
#[utoipa::path(
    get,
    path = "/api/v1/dashboard/{year}",
    params(("year", Path, description = "Fiscal year")),
    responses(
        (status = 200, description = "Year summary", body = YearSummary),
        (status = 403, description = "Manager only")
    ),
    tag = "Dashboard",
    security(("bearer_auth" = []))
)]
pub async fn year_dashboard(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<SummaryCache>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let summary = cache.year_summary(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(summary.as_ref()))
}
