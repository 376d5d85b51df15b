use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::summary::SummaryCache;
use crate::auth::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::fiscal::{FiscalResult, YearBalance, balance::resolve_used};
use crate::model::audit_log::{AuditAction, NewAuditEntry};
use crate::model::employee::Employee;
use crate::store::{audit_log, employees, usage_details};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Reconciliation {
    #[schema(example = "E1024")]
    pub employee_num: String,
    #[schema(example = 2025)]
    pub year: i32,
    /// Used total before reconciling.
    pub previous_used: f64,
    /// Sum of usage detail rows drawn from this year's grant, absent when none exist.
    pub detail_total: Option<f64>,
    pub used: f64,
    pub balance: f64,
    pub changed: bool,
}

/// Balance of `row` once its used total is replaced by the authoritative one.
pub(super) fn reconciled(row: &Employee, detail_total: Option<f64>) -> FiscalResult<YearBalance> {
    YearBalance::new(
        row.year,
        row.granted,
        resolve_used(row.used, detail_total),
        row.expired,
    )
}

#[instrument(skip(pool, cache, actor), fields(user_id = actor.user_id))]
pub async fn reconcile(
    pool: &MySqlPool,
    cache: &SummaryCache,
    actor: &AuthUser,
    employee_num: &str,
    year: i32,
) -> ApiResult<Reconciliation> {
    actor.require_manager()?;

    let mut tx = pool.begin().await?;
    let mut row = employees::lock_history(&mut tx, employee_num, year)
        .await?
        .into_iter()
        .find(|r| r.year == year)
        .ok_or_else(|| ApiError::not_found("Employee leave record"))?;

    let detail_total = usage_details::consumed(&mut *tx, employee_num, year).await?;
    let balance = reconciled(&row, detail_total)?;
    let previous_used = row.used;
    let changed = (balance.used - previous_used).abs() > crate::fiscal::balance::DAY_EPSILON;

    if changed {
        let before = serde_json::to_value(&row).ok();
        row.apply(&balance);
        employees::save_balances(&mut *tx, &row).await?;
        audit_log::insert(
            &mut *tx,
            &NewAuditEntry {
                user_id: Some(actor.user_id),
                action: AuditAction::Reconcile,
                entity_type: "employee",
                entity_id: format!("{employee_num}/{year}"),
                old_value: before,
                new_value: serde_json::to_value(&row).ok(),
            },
        )
        .await?;
    }
    tx.commit().await?;

    if changed {
        cache.invalidate(year).await;
        info!(%employee_num, year, previous_used, used = row.used, "Used total reconciled");
    }

    Ok(Reconciliation {
        employee_num: employee_num.to_string(),
        year,
        previous_used,
        detail_total,
        used: row.used,
        balance: row.balance,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(granted: f64, used: f64) -> Employee {
        Employee {
            id: 1,
            employee_num: "E1".into(),
            year: 2025,
            name: "Sato".into(),
            haken: None,
            hire_date: None,
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
    fn detail_rows_override_ledger_figure() {
        let b = reconciled(&row(12.0, 3.0), Some(4.5)).unwrap();
        assert_eq!(b.used, 4.5);
        assert_eq!(b.remaining(), 7.5);
    }

    #[test]
    fn ledger_figure_stands_without_details() {
        let b = reconciled(&row(12.0, 3.0), None).unwrap();
        assert_eq!(b.used, 3.0);
    }

    #[test]
    fn details_beyond_the_grant_are_rejected() {
        assert!(reconciled(&row(10.0, 3.0), Some(11.0)).is_err());
    }
}
