use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::auth::AuthUser,
    config::LeavePolicy,
    error::{ApiError, ApiResult},
    fiscal::{WorkPattern, YearBalance, carryover::grant_for_fiscal_year},
    model::{
        audit_log::{AuditAction, NewAuditEntry},
        employee::Employee,
        usage_detail::UsageDetail,
    },
    services::{reconcile, summary::SummaryCache},
    store::{
        audit_log,
        employees::{self, EmployeeFilter, NewEmployee},
        usage_details,
    },
    utils::db_utils::{ColumnKind, SqlValue, build_update_sql, execute_update, page_window},
};

const ENTITY: &str = "employee";

/// Columns a manual edit may change. Day counts only move through the engine.
const EDITABLE: &[(&str, ColumnKind)] = &[
    ("name", ColumnKind::Text),
    ("haken", ColumnKind::Text),
    ("hire_date", ColumnKind::Date),
    ("grant_date", ColumnKind::Date),
];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "E1024")]
    pub employee_num: String,
    #[schema(example = 2025)]
    pub year: i32,
    #[schema(example = "山田 太郎")]
    pub name: String,
    #[schema(example = "Tokai Plant", nullable = true)]
    pub haken: Option<String>,
    #[schema(example = "2021-04-01", format = "date", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,
    #[schema(example = "2025-10-01", format = "date", value_type = Option<String>)]
    pub grant_date: Option<NaiveDate>,
    /// Computed from the hire date when omitted.
    #[schema(example = 14.0, nullable = true)]
    pub granted: Option<f64>,
    #[schema(example = 0.0, nullable = true)]
    pub used: Option<f64>,
    #[serde(default)]
    pub work_pattern: WorkPattern,
}

/// Patch accepted by `update_employee`. Absent fields are left alone.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateEmployee {
    #[schema(example = "山田 太郎")]
    pub name: Option<String>,
    #[schema(example = "Plant B", nullable = true)]
    pub haken: Option<String>,
    #[schema(example = "2021-04-01", format = "date", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,
    #[schema(example = "2025-10-01", format = "date", value_type = Option<String>)]
    pub grant_date: Option<NaiveDate>,
}

/// Matches the VARCHAR(128) name and haken columns.
const MAX_TEXT_CHARS: usize = 128;

impl UpdateEmployee {
    fn parse(body: &Value) -> ApiResult<Self> {
        // a null name would otherwise read as "not given"
        if body.get("name").is_some_and(Value::is_null) {
            return Err(ApiError::BadRequest("name cannot be empty".into()));
        }
        let patch: Self = serde_json::from_value(body.clone())
            .map_err(|e| ApiError::BadRequest(format!("Invalid update: {e}")))?;
        patch.validate()?;
        Ok(patch)
    }

    fn validate(&self) -> ApiResult<()> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ApiError::BadRequest("name cannot be empty".into()));
        }
        for (field, value) in [("name", &self.name), ("haken", &self.haken)] {
            if value.as_deref().is_some_and(|v| v.chars().count() > MAX_TEXT_CHARS) {
                return Err(ApiError::BadRequest(format!(
                    "{field} is longer than {MAX_TEXT_CHARS} characters"
                )));
            }
        }
        if let (Some(hire), Some(grant)) = (self.hire_date, self.grant_date) {
            if grant < hire {
                return Err(ApiError::BadRequest("grant_date cannot precede hire_date".into()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    /// Fiscal year
    pub year: Option<i32>,
    /// Dispatch destination
    pub haken: Option<String>,
    /// Matches name or employee number
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 152)]
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeFilters {
    #[schema(example = json!([2025, 2024]))]
    pub years: Vec<i32>,
    #[schema(example = json!(["Plant A", "Plant B"]))]
    pub haken: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct FilterQuery {
    /// Year for the haken list; the newest year when omitted
    pub year: Option<i32>,
}

async fn audit(pool: &MySqlPool, auth: &AuthUser, action: AuditAction, num: &str, year: i32, old: Option<&Employee>, new: Option<&Employee>) -> ApiResult<()> {
    audit_log::insert(
        pool,
        &NewAuditEntry {
            user_id: Some(auth.user_id),
            action,
            entity_type: ENTITY,
            entity_id: format!("{num}/{year}"),
            old_value: old.and_then(|e| serde_json::to_value(e).ok()),
            new_value: new.and_then(|e| serde_json::to_value(e).ok()),
        },
    )
    .await?;
    Ok(())
}

fn not_found() -> ApiError {
    ApiError::not_found("Employee leave record")
}

/// Create a leave record for one employee and fiscal year
#[utoipa::path(
    post,
    path = "/api/v1/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Record created", body = Employee),
        (status = 400, description = "Invalid day counts"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "A record for this employee and year already exists")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<LeavePolicy>,
    cache: web::Data<SummaryCache>,
    payload: web::Json<CreateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let payload = payload.into_inner();

    let employee_num = payload.employee_num.trim().to_string();
    let name = payload.name.trim().to_string();
    if employee_num.is_empty() || name.is_empty() {
        return Err(ApiError::BadRequest("employee_num and name are required".into()));
    }

    let granted = match (payload.granted, payload.hire_date) {
        (Some(days), _) => days,
        (None, Some(hire)) => grant_for_fiscal_year(
            hire,
            payload.year,
            policy.fiscal_year_start_month,
            payload.work_pattern,
        )?,
        (None, None) => 0.0,
    };
    let used = payload.used.unwrap_or(0.0);
    YearBalance::new(payload.year, granted, used, 0.0)?;

    let new = NewEmployee {
        employee_num: employee_num.clone(),
        year: payload.year,
        name,
        haken: payload.haken.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()),
        hire_date: payload.hire_date,
        grant_date: payload.grant_date,
        granted,
        used,
        expired: 0.0,
        carried_over: 0.0,
    };
    employees::insert(pool.get_ref(), &new).await.map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::Conflict(format!(
            "Employee {employee_num} already has a record for {}",
            payload.year
        )),
        other => other,
    })?;

    let created = employees::find(pool.get_ref(), &employee_num, payload.year)
        .await?
        .ok_or_else(not_found)?;
    audit(pool.get_ref(), &auth, AuditAction::Create, &employee_num, payload.year, None, Some(&created)).await?;
    cache.invalidate(payload.year).await;

    info!(%employee_num, year = payload.year, granted, "Leave record created");
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/v1/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated leave records", body = EmployeeListResponse),
        (status = 403, description = "Forbidden")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;

    let (page, per_page, offset) = page_window(query.page, query.per_page, 20);
    let filter = EmployeeFilter {
        year: query.year,
        haken: query.haken.clone().filter(|h| !h.trim().is_empty()),
        search: query.search.clone().filter(|s| !s.trim().is_empty()),
    };
    debug!(?filter, page, per_page, "Listing employees");

    let (data, total) = employees::list(pool.get_ref(), &filter, per_page, offset).await?;
    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data,
        page,
        per_page,
        total,
    }))
}

/// Fiscal years on record and the dispatch destinations of one year
#[utoipa::path(
    get,
    path = "/api/v1/employees/filters",
    params(FilterQuery),
    responses((status = 200, description = "Filter values", body = EmployeeFilters)),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn employee_filters(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<FilterQuery>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let years = employees::years(pool.get_ref()).await?;
    let haken = match query.year.or_else(|| years.first().copied()) {
        Some(year) => employees::haken_list(pool.get_ref(), year).await?,
        None => Vec::new(),
    };
    Ok(HttpResponse::Ok().json(EmployeeFilters { years, haken }))
}

/// Every fiscal year on record for one employee
#[utoipa::path(
    get,
    path = "/api/v1/employees/{employee_num}",
    params(("employee_num", Path, description = "Employee number")),
    responses(
        (status = 200, description = "Records, oldest year first", body = [Employee]),
        (status = 403, description = "Not your record"),
        (status = 404, description = "No records")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn employee_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let employee_num = path.into_inner();
    auth.require_access_to(&employee_num)?;

    let rows = employees::history(pool.get_ref(), &employee_num).await?;
    if rows.is_empty() {
        return Err(not_found());
    }
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/employees/{employee_num}/{year}",
    params(
        ("employee_num", Path, description = "Employee number"),
        ("year", Path, description = "Fiscal year")
    ),
    responses(
        (status = 200, description = "Leave record", body = Employee),
        (status = 403, description = "Not your record"),
        (status = 404, description = "Not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(String, i32)>,
) -> ApiResult<HttpResponse> {
    let (employee_num, year) = path.into_inner();
    auth.require_access_to(&employee_num)?;

    let row = employees::find(pool.get_ref(), &employee_num, year)
        .await?
        .ok_or_else(not_found)?;
    Ok(HttpResponse::Ok().json(row))
}

/// Update descriptive fields (name, haken, hire_date, grant_date)
#[utoipa::path(
    put,
    path = "/api/v1/employees/{employee_num}/{year}",
    params(
        ("employee_num", Path, description = "Employee number"),
        ("year", Path, description = "Fiscal year")
    ),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Updated record", body = Employee),
        (status = 400, description = "Unknown or read-only field"),
        (status = 404, description = "Not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(String, i32)>,
    body: web::Json<Value>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let (employee_num, year) = path.into_inner();

    let patch = UpdateEmployee::parse(&body)?;
    debug!(?patch, %employee_num, year, "Updating employee record");

    let before = employees::find(pool.get_ref(), &employee_num, year)
        .await?
        .ok_or_else(not_found)?;

    let update = build_update_sql(
        "employees",
        &body,
        EDITABLE,
        &[
            ("employee_num", SqlValue::String(employee_num.clone())),
            ("year", SqlValue::I64(year as i64)),
        ],
    )?;
    execute_update(pool.get_ref(), update).await?;

    let after = employees::find(pool.get_ref(), &employee_num, year)
        .await?
        .ok_or_else(not_found)?;
    audit(pool.get_ref(), &auth, AuditAction::Update, &employee_num, year, Some(&before), Some(&after)).await?;
    Ok(HttpResponse::Ok().json(after))
}

#[utoipa::path(
    delete,
    path = "/api/v1/employees/{employee_num}/{year}",
    params(
        ("employee_num", Path, description = "Employee number"),
        ("year", Path, description = "Fiscal year")
    ),
    responses(
        (status = 200, description = "Deleted", body = Object, example = json!({"message": "Successfully deleted"})),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<SummaryCache>,
    path: web::Path<(String, i32)>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let (employee_num, year) = path.into_inner();

    let before = employees::find(pool.get_ref(), &employee_num, year)
        .await?
        .ok_or_else(not_found)?;
    if employees::delete(pool.get_ref(), &employee_num, year).await? == 0 {
        return Err(not_found());
    }
    audit(pool.get_ref(), &auth, AuditAction::Delete, &employee_num, year, Some(&before), None).await?;
    cache.invalidate(year).await;

    info!(%employee_num, year, "Leave record deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

/// Individual leave days recorded for one employee and year
#[utoipa::path(
    get,
    path = "/api/v1/employees/{employee_num}/{year}/usage",
    params(
        ("employee_num", Path, description = "Employee number"),
        ("year", Path, description = "Fiscal year")
    ),
    responses(
        (status = 200, description = "Usage days, by date", body = [UsageDetail]),
        (status = 403, description = "Not your record")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn usage_details(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(String, i32)>,
) -> ApiResult<HttpResponse> {
    let (employee_num, year) = path.into_inner();
    auth.require_access_to(&employee_num)?;
    let rows = usage_details::list(pool.get_ref(), &employee_num, year).await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Recompute `used` from usage detail rows
#[utoipa::path(
    post,
    path = "/api/v1/employees/{employee_num}/{year}/reconcile",
    params(
        ("employee_num", Path, description = "Employee number"),
        ("year", Path, description = "Fiscal year")
    ),
    responses(
        (status = 200, description = "Reconciliation result", body = reconcile::Reconciliation),
        (status = 400, description = "Recorded days exceed the grant"),
        (status = 404, description = "Not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn reconcile_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    cache: web::Data<SummaryCache>,
    path: web::Path<(String, i32)>,
) -> ApiResult<HttpResponse> {
    let (employee_num, year) = path.into_inner();
    let result = reconcile::reconcile(pool.get_ref(), &cache, &auth, &employee_num, year).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_accepts_descriptive_fields() {
        let patch = UpdateEmployee::parse(&json!({"haken": "Plant B", "hire_date": "2021-04-01"})).unwrap();
        assert_eq!(patch.haken.as_deref(), Some("Plant B"));
        assert_eq!(patch.hire_date, NaiveDate::from_ymd_opt(2021, 4, 1));
        assert!(patch.name.is_none());
    }

    #[test]
    fn patch_rejects_day_counts_and_bad_values() {
        for body in [
            json!({"granted": 20.0}),
            json!({"name": "  "}),
            json!({"name": null}),
            json!({"hire_date": "April 1st"}),
            json!({"hire_date": "2022-04-01", "grant_date": "2021-10-01"}),
            json!({"haken": "x".repeat(129)}),
        ] {
            assert!(
                matches!(UpdateEmployee::parse(&body), Err(ApiError::BadRequest(_))),
                "{body} should be rejected"
            );
        }
    }
}
