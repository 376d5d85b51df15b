use actix_web::{HttpResponse, web};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::IntoParams;

use crate::{
    auth::auth::AuthUser,
    config::LeavePolicy,
    error::ApiResult,
    fiscal::{WorkPattern, grant},
    services::{summary::SummaryCache, year_end},
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct GrantPreviewQuery {
    /// Hire date (YYYY-MM-DD)
    #[param(value_type = String, format = "date", example = "2021-04-01")]
    pub hire_date: NaiveDate,
    /// Evaluation date, today when omitted
    #[param(value_type = Option<String>, format = "date")]
    pub as_of: Option<NaiveDate>,
    /// Scheduled days per week for part-time staff (1-4); full-time when omitted
    pub days_per_week: Option<u8>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExpiringQuery {
    /// Reference date, today when omitted
    #[param(value_type = Option<String>, format = "date")]
    pub as_of: Option<NaiveDate>,
    /// Look-ahead in days; the configured warning window when omitted
    pub window_days: Option<i64>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Statutory grant for a hire date, with the next grant
#[utoipa::path(
    get,
    path = "/api/v1/fiscal/grant-preview",
    params(GrantPreviewQuery),
    responses(
        (status = 200, description = "Grant preview", body = crate::fiscal::grant::GrantPreview),
        (status = 400, description = "as_of before hire_date or bad schedule")
    ),
    tag = "Fiscal",
    security(("bearer_auth" = []))
)]
pub async fn grant_preview(query: web::Query<GrantPreviewQuery>) -> ApiResult<HttpResponse> {
    let pattern = match query.days_per_week {
        Some(days) if days < 5 => WorkPattern::PartTime { days_per_week: days },
        _ => WorkPattern::FullTime,
    };
    let preview = grant::preview(query.hire_date, query.as_of.unwrap_or_else(today), pattern)?;
    Ok(HttpResponse::Ok().json(preview))
}

/// Close a fiscal year: carry balances into the next year and expire the rest
#[utoipa::path(
    post,
    path = "/api/v1/fiscal/year-end/{year}",
    params(("year", Path, description = "Fiscal year being closed")),
    responses(
        (status = 200, description = "Carryover report", body = year_end::YearEndReport),
        (status = 403, description = "Admin only"),
        (status = 404, description = "No records for that year")
    ),
    tag = "Fiscal",
    security(("bearer_auth" = []))
)]
pub async fn run_year_end(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<LeavePolicy>,
    cache: web::Data<SummaryCache>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    let year = path.into_inner();
    let report = year_end::run(pool.get_ref(), &policy, &cache, &auth, year).await?;
    info!(
        year,
        processed = report.processed,
        skipped = report.skipped.len(),
        "Year-end carryover finished"
    );
    Ok(HttpResponse::Ok().json(report))
}

/// Days lapsing soon, soonest first
#[utoipa::path(
    get,
    path = "/api/v1/fiscal/expiring",
    params(ExpiringQuery),
    responses(
        (status = 200, description = "Expiring days per employee and grant year", body = [year_end::EmployeeExpiring]),
        (status = 403, description = "Manager only")
    ),
    tag = "Fiscal",
    security(("bearer_auth" = []))
)]
pub async fn expiring(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<LeavePolicy>,
    query: web::Query<ExpiringQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let as_of = query.as_of.unwrap_or_else(today);
    let rows = year_end::expiring(pool.get_ref(), &policy, as_of, query.window_days).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test};

    #[actix_web::test]
    async fn previews_full_time_grant() {
        let app = test::init_service(App::new().route("/grant-preview", web::get().to(grant_preview))).await;
        let req = test::TestRequest::get()
            .uri("/grant-preview?hire_date=2020-04-01&as_of=2023-04-01")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["granted_days"], 12.0);
        assert_eq!(body["next_grant_date"], "2023-10-01");
        assert_eq!(body["next_grant_days"], 14.0);
    }

    #[actix_web::test]
    async fn previews_part_time_grant() {
        let app = test::init_service(App::new().route("/grant-preview", web::get().to(grant_preview))).await;
        let req = test::TestRequest::get()
            .uri("/grant-preview?hire_date=2024-04-01&as_of=2024-10-01&days_per_week=3")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["granted_days"], 5.0);
    }

    #[actix_web::test]
    async fn as_of_before_hire_is_bad_request() {
        let app = test::init_service(App::new().route("/grant-preview", web::get().to(grant_preview))).await;
        let req = test::TestRequest::get()
            .uri("/grant-preview?hire_date=2024-04-01&as_of=2024-01-01")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
