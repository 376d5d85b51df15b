use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    fiscal::{ComplianceStatus, balance::days_taken, compliance::ComplianceTally},
    services::summary::{ComplianceEntry, compliance_entry, compliance_report, load_days_taken},
    store::{employees, usage_details},
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ComplianceQuery {
    /// Only entries with this status (COMPLIANT, AT_RISK, HIGH_RISK, CRITICAL, EXEMPT)
    pub status: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ComplianceReport {
    #[schema(example = 2025)]
    pub year: i32,
    /// Counts over every employee of the year, regardless of the status filter.
    pub tally: ComplianceTally,
    #[schema(example = 87.5)]
    pub compliance_rate: f64,
    pub entries: Vec<ComplianceEntry>,
}

/// Five-day obligation status of every employee in a fiscal year
#[utoipa::path(
    get,
    path = "/api/v1/compliance/{year}",
    params(("year", Path, description = "Fiscal year"), ComplianceQuery),
    responses(
        (status = 200, description = "Compliance report", body = ComplianceReport),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Manager only")
    ),
    tag = "Compliance",
    security(("bearer_auth" = []))
)]
pub async fn year_compliance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i32>,
    query: web::Query<ComplianceQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let year = path.into_inner();

    let only = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .to_uppercase()
                .parse::<ComplianceStatus>()
                .map_err(|_| ApiError::BadRequest(format!("Unknown compliance status {s:?}")))
        })
        .transpose()?;

    let rows = employees::for_year(pool.get_ref(), year).await?;
    let taken = load_days_taken(pool.get_ref(), year, &rows).await?;
    let mut tally = ComplianceTally::default();
    for entry in compliance_report(&rows, &taken, None)? {
        tally.record(entry.status);
    }
    let entries = compliance_report(&rows, &taken, only)?;

    Ok(HttpResponse::Ok().json(ComplianceReport {
        year,
        compliance_rate: tally.compliance_rate(),
        tally,
        entries,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/compliance/{employee_num}/{year}",
    params(
        ("employee_num", Path, description = "Employee number"),
        ("year", Path, description = "Fiscal year")
    ),
    responses(
        (status = 200, description = "Compliance status", body = ComplianceEntry),
        (status = 403, description = "Not your record"),
        (status = 404, description = "No record for that year")
    ),
    tag = "Compliance",
    security(("bearer_auth" = []))
)]
pub async fn employee_compliance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(String, i32)>,
) -> ApiResult<HttpResponse> {
    let (employee_num, year) = path.into_inner();
    auth.require_access_to(&employee_num)?;

    let row = employees::find(pool.get_ref(), &employee_num, year)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee leave record"))?;
    let taken = match usage_details::totals_for(pool.get_ref(), &employee_num, year).await? {
        Some(t) => days_taken(row.used, t.consumed, t.taken),
        None => row.used,
    };
    Ok(HttpResponse::Ok().json(compliance_entry(&row, taken)?))
}
