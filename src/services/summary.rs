//! Year dashboards and compliance reports, cached per fiscal year.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::fiscal::{
    ComplianceStatus,
    balance::{days_taken, usage_rate},
    compliance::{self, ComplianceTally},
};
use crate::model::employee::Employee;
use crate::model::usage_detail::UsageTotals;
use crate::store::{employees, usage_details};

const TOP_USERS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComplianceEntry {
    #[schema(example = "E1024")]
    pub employee_num: String,
    pub name: String,
    pub haken: Option<String>,
    pub granted: f64,
    /// Days taken during the fiscal year, from whichever grant.
    pub used: f64,
    pub status: ComplianceStatus,
    pub days_needed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HakenStat {
    pub haken: String,
    pub employees: u32,
    pub granted: f64,
    pub used: f64,
    pub usage_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TopUser {
    pub employee_num: String,
    pub name: String,
    pub used: f64,
    pub usage_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct YearSummary {
    #[schema(example = 2025)]
    pub year: i32,
    pub employee_count: u32,
    pub total_granted: f64,
    /// Days taken during the year.
    pub total_used: f64,
    pub total_expired: f64,
    pub total_balance: f64,
    /// Used over granted across everyone, in percent.
    pub usage_rate: f64,
    pub compliance: ComplianceTally,
    pub compliance_rate: f64,
    /// Obligated employees not yet at five days, fewest days taken first.
    pub at_risk: Vec<ComplianceEntry>,
    pub top_users: Vec<TopUser>,
    pub by_haken: Vec<HakenStat>,
}

/// Days each employee took during a fiscal year, keyed by employee number.
pub type DaysTaken = HashMap<String, f64>;

/// Combines the rows of one year with the usage totals touching it.
pub fn days_taken_by_employee(rows: &[Employee], totals: &[UsageTotals]) -> DaysTaken {
    rows.iter()
        .map(|row| {
            let taken = match totals.iter().find(|t| t.employee_num == row.employee_num) {
                Some(t) => days_taken(row.used, t.consumed, t.taken),
                None => row.used,
            };
            (row.employee_num.clone(), taken)
        })
        .collect()
}

pub async fn load_days_taken(pool: &MySqlPool, year: i32, rows: &[Employee]) -> ApiResult<DaysTaken> {
    let totals = usage_details::totals_for_year(pool, year).await?;
    Ok(days_taken_by_employee(rows, &totals))
}

fn taken_of(row: &Employee, taken: &DaysTaken) -> f64 {
    taken.get(&row.employee_num).copied().unwrap_or(row.used)
}

pub fn compliance_entry(row: &Employee, taken: f64) -> ApiResult<ComplianceEntry> {
    let check = compliance::check(row.granted, taken)?;
    Ok(ComplianceEntry {
        employee_num: row.employee_num.clone(),
        name: row.name.clone(),
        haken: row.haken.clone(),
        granted: row.granted,
        used: taken,
        status: check.status,
        days_needed: check.days_needed,
    })
}

pub fn compliance_report(
    rows: &[Employee],
    taken: &DaysTaken,
    only: Option<ComplianceStatus>,
) -> ApiResult<Vec<ComplianceEntry>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let entry = compliance_entry(row, taken_of(row, taken))?;
        if only.is_none_or(|s| s == entry.status) {
            out.push(entry);
        }
    }
    Ok(out)
}

pub fn summarize(year: i32, rows: &[Employee], taken: &DaysTaken) -> ApiResult<YearSummary> {
    let mut tally = ComplianceTally::default();
    let mut at_risk = Vec::new();
    let mut by_haken: BTreeMap<String, HakenStat> = BTreeMap::new();
    let (mut granted, mut used, mut expired, mut balance) = (0.0, 0.0, 0.0, 0.0);

    for row in rows {
        let row_taken = taken_of(row, taken);
        granted += row.granted;
        used += row_taken;
        expired += row.expired;
        balance += row.balance;

        let entry = compliance_entry(row, row_taken)?;
        tally.record(entry.status);
        if entry.status.is_violation_risk() {
            at_risk.push(entry);
        }

        let key = row.haken.clone().unwrap_or_else(|| "-".to_string());
        let stat = by_haken.entry(key.clone()).or_insert_with(|| HakenStat {
            haken: key,
            employees: 0,
            granted: 0.0,
            used: 0.0,
            usage_rate: 0.0,
        });
        stat.employees += 1;
        stat.granted += row.granted;
        stat.used += row_taken;
    }

    at_risk.sort_by(|a, b| a.used.total_cmp(&b.used).then_with(|| a.employee_num.cmp(&b.employee_num)));

    let mut top: Vec<(&Employee, f64)> = rows
        .iter()
        .map(|r| (r, taken_of(r, taken)))
        .filter(|(_, t)| *t > 0.0)
        .collect();
    top.sort_by(|(a, ta), (b, tb)| tb.total_cmp(ta).then_with(|| a.employee_num.cmp(&b.employee_num)));
    let top_users = top
        .into_iter()
        .take(TOP_USERS)
        .map(|(r, t)| TopUser {
            employee_num: r.employee_num.clone(),
            name: r.name.clone(),
            used: t,
            usage_rate: usage_rate(r.granted, t),
        })
        .collect();

    let by_haken = by_haken
        .into_values()
        .map(|mut s| {
            s.usage_rate = usage_rate(s.granted, s.used);
            s
        })
        .collect();

    Ok(YearSummary {
        year,
        employee_count: rows.len() as u32,
        total_granted: granted,
        total_used: used,
        total_expired: expired,
        total_balance: balance,
        usage_rate: usage_rate(granted, used),
        compliance_rate: tally.compliance_rate(),
        compliance: tally,
        at_risk,
        top_users,
        by_haken,
    })
}

/// Per-year summaries shared by all workers.
#[derive(Clone)]
pub struct SummaryCache {
    inner: Cache<i32, Arc<YearSummary>>,
}

impl SummaryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(64) // a handful of fiscal years
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn year_summary(&self, pool: &MySqlPool, year: i32) -> ApiResult<Arc<YearSummary>> {
        let pool = pool.clone();
        self.inner
            .try_get_with(year, async move {
                let rows = employees::for_year(&pool, year).await?;
                let taken = load_days_taken(&pool, year, &rows).await?;
                tracing::debug!(year, rows = rows.len(), "Building year summary");
                summarize(year, &rows, &taken).map(Arc::new)
            })
            .await
            .map_err(|e: Arc<ApiError>| match &*e {
                ApiError::BadRequest(msg) => ApiError::BadRequest(msg.clone()),
                _ => ApiError::Internal,
            })
    }

    pub async fn invalidate(&self, year: i32) {
        self.inner.invalidate(&year).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(num: &str, haken: Option<&str>, granted: f64, used: f64) -> Employee {
        Employee {
            id: 0,
            employee_num: num.into(),
            year: 2025,
            name: format!("name-{num}"),
            haken: haken.map(String::from),
            hire_date: None,
            grant_date: None,
            granted,
            used,
            expired: 0.0,
            balance: granted - used,
            carried_over: 0.0,
            usage_rate: usage_rate(granted, used),
            closed_at: None,
            updated_at: Utc::now(),
        }
    }

    fn rows() -> Vec<Employee> {
        vec![
            row("E1", Some("Plant A"), 12.0, 4.0),
            row("E2", Some("Plant A"), 12.0, 0.0),
            row("E3", Some("Plant B"), 8.0, 0.0),
            row("E4", None, 20.0, 10.0),
        ]
    }

    #[test]
    fn summary_totals_and_tally() {
        let s = summarize(2025, &rows(), &DaysTaken::new()).unwrap();
        assert_eq!(s.employee_count, 4);
        assert_eq!(s.total_granted, 52.0);
        assert_eq!(s.total_used, 14.0);
        assert_eq!(s.compliance.compliant, 1);
        assert_eq!(s.compliance.at_risk, 1);
        assert_eq!(s.compliance.critical, 1);
        assert_eq!(s.compliance.exempt, 1);
        assert_eq!(s.compliance_rate, 33.33);
    }

    #[test]
    fn at_risk_lists_fewest_days_first() {
        let s = summarize(2025, &rows(), &DaysTaken::new()).unwrap();
        let nums: Vec<&str> = s.at_risk.iter().map(|e| e.employee_num.as_str()).collect();
        assert_eq!(nums, vec!["E2", "E1"]);
        assert_eq!(s.at_risk[1].days_needed, 1.0);
    }

    #[test]
    fn groups_by_dispatch_destination() {
        let s = summarize(2025, &rows(), &DaysTaken::new()).unwrap();
        let a = s.by_haken.iter().find(|h| h.haken == "Plant A").unwrap();
        assert_eq!(a.employees, 2);
        assert_eq!(a.usage_rate, 16.67);
        assert!(s.by_haken.iter().any(|h| h.haken == "-"));
        assert_eq!(s.top_users[0].employee_num, "E4");
        assert_eq!(s.top_users.len(), 2);
    }

    #[test]
    fn report_filters_by_status() {
        let only = compliance_report(&rows(), &DaysTaken::new(), Some(ComplianceStatus::Critical)).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].employee_num, "E2");
        assert_eq!(compliance_report(&rows(), &DaysTaken::new(), None).unwrap().len(), 4);
    }

    #[test]
    fn days_drawn_from_last_years_grant_count_this_year() {
        let rows = rows();
        // E2 has nothing on the 2025 row but took 5 days against the 2024 grant
        let totals = vec![UsageTotals {
            employee_num: "E2".into(),
            taken: 5.0,
            consumed: 0.0,
        }];
        let taken = days_taken_by_employee(&rows, &totals);
        assert_eq!(taken["E2"], 5.0);
        assert_eq!(taken["E1"], 4.0);

        let s = summarize(2025, &rows, &taken).unwrap();
        assert_eq!(s.compliance.compliant, 2);
        assert_eq!(s.compliance.critical, 0);
        assert_eq!(s.total_used, 19.0);
        let e2 = compliance_report(&rows, &taken, None).unwrap().remove(1);
        assert_eq!(e2.status, ComplianceStatus::Compliant);
        assert_eq!(e2.used, 5.0);
    }
}
