use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::registry::{RegistryCategory, RegistryEmployee},
    store::registry,
    utils::db_utils::page_window,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct RegistryQuery {
    /// `active` or `resigned`
    pub status: Option<String>,
    /// Matches name, kana or employee number
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct RegistryListResponse {
    pub category: RegistryCategory,
    pub data: Vec<RegistryEmployee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 50)]
    pub per_page: u32,
    #[schema(example = 312)]
    pub total: i64,
}

/// Employees of one registry (genzai, ukeoi or staff)
#[utoipa::path(
    get,
    path = "/api/v1/registry/{category}",
    params(("category", Path, description = "genzai, ukeoi or staff"), RegistryQuery),
    responses(
        (status = 200, description = "Paginated registry rows", body = RegistryListResponse),
        (status = 400, description = "Unknown category"),
        (status = 403, description = "Manager only")
    ),
    tag = "Registry",
    security(("bearer_auth" = []))
)]
pub async fn list_registry(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    query: web::Query<RegistryQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let raw = path.into_inner();
    let category: RegistryCategory = raw
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown registry category {raw:?}")))?;

    let (page, per_page, offset) = page_window(query.page, query.per_page, 50);
    let status = query.status.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let (data, total) = registry::list(pool.get_ref(), category, status, search, per_page, offset).await?;
    Ok(HttpResponse::Ok().json(RegistryListResponse {
        category,
        data,
        page,
        per_page,
        total,
    }))
}
