use actix_web::{HttpResponse, http::header, web};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::info;

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    fiscal::compliance,
    model::employee::Employee,
    services::summary::{DaysTaken, load_days_taken},
    store::employees,
};

/// One CSV line. Column order follows field order.
#[derive(Serialize)]
struct ExportRow<'a> {
    employee_num: &'a str,
    name: &'a str,
    haken: &'a str,
    hire_date: String,
    grant_date: String,
    year: i32,
    granted: f64,
    used: f64,
    expired: f64,
    balance: f64,
    carried_over: f64,
    usage_rate: f64,
    /// Days taken during the year, from whichever grant.
    taken: f64,
    compliance: String,
}

impl<'a> ExportRow<'a> {
    fn new(row: &'a Employee, taken: f64) -> ApiResult<Self> {
        let fmt_date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
        Ok(Self {
            employee_num: &row.employee_num,
            name: &row.name,
            haken: row.haken.as_deref().unwrap_or(""),
            hire_date: fmt_date(row.hire_date),
            grant_date: fmt_date(row.grant_date),
            year: row.year,
            granted: row.granted,
            used: row.used,
            expired: row.expired,
            balance: row.balance,
            carried_over: row.carried_over,
            usage_rate: row.usage_rate,
            taken,
            compliance: compliance::classify(row.granted, taken)?.to_string(),
        })
    }
}

fn to_csv(rows: &[Employee], taken: &DaysTaken) -> ApiResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        let row_taken = taken.get(&row.employee_num).copied().unwrap_or(row.used);
        writer.serialize(ExportRow::new(row, row_taken)?).map_err(|e| {
            tracing::error!(error = %e, employee_num = %row.employee_num, "CSV serialization failed");
            ApiError::Internal
        })?;
    }
    writer.into_inner().map_err(|e| {
        tracing::error!(error = %e, "CSV flush failed");
        ApiError::Internal
    })
}

/// Download a fiscal year's leave records as CSV
#[utoipa::path(
    get,
    path = "/api/v1/export/{year}",
    params(("year", Path, description = "Fiscal year")),
    responses(
        (status = 200, description = "CSV attachment", content_type = "text/csv", body = String),
        (status = 403, description = "Manager only")
    ),
    tag = "Export",
    security(("bearer_auth" = []))
)]
pub async fn export_year(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i32>,
) -> ApiResult<HttpResponse> {
    auth.require_manager()?;
    let year = path.into_inner();

    let rows = employees::for_year(pool.get_ref(), year).await?;
    let taken = load_days_taken(pool.get_ref(), year, &rows).await?;
    let body = to_csv(&rows, &taken)?;
    info!(year, rows = rows.len(), user_id = auth.user_id, "Leave records exported");

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"yukyu_{year}.csv\""),
        ))
        .body(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn row(num: &str, haken: Option<&str>, granted: f64, used: f64) -> Employee {
        Employee {
            id: 1,
            employee_num: num.into(),
            year: 2025,
            name: "Sato, Ken".into(),
            haken: haken.map(Into::into),
            hire_date: NaiveDate::from_ymd_opt(2020, 4, 1),
            grant_date: None,
            granted,
            used,
            expired: 0.0,
            balance: granted - used,
            carried_over: 0.0,
            usage_rate: 0.0,
            closed_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn writes_header_and_quoted_rows() {
        let bytes = to_csv(
            &[row("E1", Some("Plant A"), 12.0, 4.0), row("E2", None, 8.0, 0.0)],
            &DaysTaken::new(),
        )
        .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("employee_num,name,haken,hire_date,grant_date,year,granted"));
        assert!(lines[1].starts_with("E1,\"Sato, Ken\",Plant A,2020-04-01,,2025,12.0,4.0"));
        assert!(lines[1].ends_with(",AT_RISK"));
        assert!(lines[2].ends_with(",EXEMPT"));
    }

    #[test]
    fn compliance_column_follows_days_taken() {
        let taken = DaysTaken::from([("E1".to_string(), 5.0)]);
        let bytes = to_csv(&[row("E1", None, 12.0, 0.0)], &taken).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let line = text.lines().nth(1).unwrap();
        assert!(line.ends_with(",5.0,COMPLIANT"));
    }
}
