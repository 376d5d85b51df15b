use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::summary::SummaryCache;
use super::{balances_of, write_back};
use crate::auth::auth::AuthUser;
use crate::config::LeavePolicy;
use crate::error::{ApiError, ApiResult};
use crate::fiscal::{
    Allocation, FiscalError,
    balance::{DAY_EPSILON, total_remaining},
    carryover, deduction,
};
use crate::model::audit_log::{AuditAction, NewAuditEntry};
use crate::model::employee::Employee;
use crate::model::leave_request::{
    LeaveRequest, LeaveStatus, LeaveType, LeaveUnit, charged_year, requested_days, usage_days,
};
use crate::model::notification::{NewNotification, NotificationKind};
use crate::model::usage_detail::ChargedDay;
use crate::store::{
    audit_log, employees, leave_requests, leave_requests::NewLeaveRequest, notifications,
    usage_details,
};

const ENTITY: &str = "leave_request";

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLeave {
    /// Defaults to the caller's own employee number; managers may file for others.
    #[schema(example = "E1024", nullable = true)]
    pub employee_num: Option<String>,
    #[schema(example = "2025-08-12", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2025-08-14", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "FULL_DAY")]
    pub unit: LeaveUnit,
    /// Required for HOURLY requests.
    #[schema(example = 2.0, nullable = true)]
    pub hours: Option<f64>,
    #[schema(example = "PAID")]
    pub leave_type: LeaveType,
    #[schema(example = "Family event", nullable = true)]
    pub reason: Option<String>,
}

/// Rows whose grant is still valid for a request charged to `year`.
fn valid_rows(rows: Vec<Employee>, year: i32) -> Vec<Employee> {
    rows.into_iter()
        .filter(|r| r.year == year || r.year == year - 1)
        .collect()
}

/// Pairs each dated day of a request with the grant year it was drawn from,
/// splitting a day when it straddles two allocations.
fn charge_days(days: &[(NaiveDate, f64)], allocations: &[Allocation]) -> Vec<ChargedDay> {
    let mut left: Vec<(i32, f64)> = allocations.iter().map(|a| (a.year, a.days)).collect();
    let mut idx = 0;
    let mut out = Vec::with_capacity(days.len());
    for &(use_date, amount) in days {
        let mut owed = amount;
        while owed > DAY_EPSILON && idx < left.len() {
            let (grant_year, available) = &mut left[idx];
            let take = owed.min(*available);
            if take > DAY_EPSILON {
                out.push(ChargedDay {
                    use_date,
                    days_used: take,
                    grant_year: *grant_year,
                });
            }
            owed -= take;
            *available -= take;
            if *available <= DAY_EPSILON {
                idx += 1;
            }
        }
    }
    out
}

fn audit(actor: &AuthUser, action: AuditAction, before: Option<&LeaveRequest>, after: Option<&LeaveRequest>, id: u64) -> NewAuditEntry {
    NewAuditEntry {
        user_id: Some(actor.user_id),
        action,
        entity_type: ENTITY,
        entity_id: id.to_string(),
        old_value: before.and_then(|r| serde_json::to_value(r).ok()),
        new_value: after.and_then(|r| serde_json::to_value(r).ok()),
    }
}

fn decision_notice(req: &LeaveRequest, kind: NotificationKind, title: &str) -> NewNotification {
    NewNotification {
        user_id: req.requested_by,
        kind,
        title: title.to_string(),
        message: format!(
            "{} {}..{} ({} days) is now {}",
            req.employee_num, req.start_date, req.end_date, req.days_requested, req.status
        ),
        entity_type: Some(ENTITY),
        entity_id: Some(req.id.to_string()),
    }
}

/// Summaries of the charged year and of every year days were taken from.
async fn invalidate_years(cache: &SummaryCache, req: &LeaveRequest) {
    cache.invalidate(req.year).await;
    for alloc in req.deductions.iter().filter(|a| a.year != req.year) {
        cache.invalidate(alloc.year).await;
    }
}

fn not_found() -> ApiError {
    ApiError::not_found("Leave request")
}

fn invalid_transition(from: LeaveStatus, to: LeaveStatus) -> ApiError {
    ApiError::Conflict(format!("Leave request is {from} and cannot become {to}"))
}

#[instrument(name = "leave_submit", skip(pool, policy, actor, payload), fields(user_id = actor.user_id))]
pub async fn submit(
    pool: &MySqlPool,
    policy: &LeavePolicy,
    actor: &AuthUser,
    payload: CreateLeave,
) -> ApiResult<LeaveRequest> {
    let employee_num = match payload.employee_num {
        Some(num) => {
            actor.require_access_to(&num)?;
            num
        }
        None => actor.own_employee_num()?.to_string(),
    };

    let year = charged_year(payload.start_date, payload.end_date, policy.fiscal_year_start_month)?;
    let days = requested_days(
        payload.start_date,
        payload.end_date,
        payload.unit,
        payload.hours,
        policy.hours_per_day,
    )?;

    if employees::find(pool, &employee_num, year).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "No leave record for employee {employee_num} in fiscal year {year}"
        )));
    }

    if payload.leave_type.deducts_balance() {
        // advisory check; approval re-checks under lock
        let rows = valid_rows(employees::history(pool, &employee_num).await?, year);
        let available = total_remaining(&balances_of(&rows)?);
        let pending = leave_requests::pending_days(pool, &employee_num).await?;
        if days + pending > available + DAY_EPSILON {
            return Err(FiscalError::InsufficientBalance {
                requested: days + pending,
                available,
            }
            .into());
        }
    }

    let mut tx = pool.begin().await?;
    let id = leave_requests::insert(
        &mut *tx,
        &NewLeaveRequest {
            employee_num: employee_num.clone(),
            year,
            start_date: payload.start_date,
            end_date: payload.end_date,
            unit: payload.unit,
            hours: payload.hours,
            days_requested: days,
            leave_type: payload.leave_type,
            reason: payload.reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
            requested_by: actor.user_id,
        },
    )
    .await?;

    let created = leave_requests::find(&mut *tx, id).await?.ok_or_else(not_found)?;
    audit_log::insert(&mut *tx, &audit(actor, AuditAction::Create, None, Some(&created), id)).await?;
    notifications::insert(
        &mut *tx,
        &NewNotification {
            user_id: None,
            kind: NotificationKind::LeaveRequested,
            title: "New leave request".into(),
            message: format!(
                "{employee_num} requested {days} days ({}..{})",
                created.start_date, created.end_date
            ),
            entity_type: Some(ENTITY),
            entity_id: Some(id.to_string()),
        },
    )
    .await?;
    tx.commit().await?;

    info!(leave_id = id, %employee_num, days, "Leave request submitted");
    Ok(created)
}

#[instrument(name = "leave_approve", skip(pool, policy, cache, actor), fields(user_id = actor.user_id))]
pub async fn approve(
    pool: &MySqlPool,
    policy: &LeavePolicy,
    cache: &SummaryCache,
    actor: &AuthUser,
    id: u64,
) -> ApiResult<LeaveRequest> {
    actor.require_manager()?;

    let mut tx = pool.begin().await?;
    let before = leave_requests::lock(&mut tx, id).await?.ok_or_else(not_found)?;
    if !before.status.can_transition_to(LeaveStatus::Approved) {
        return Err(invalid_transition(before.status, LeaveStatus::Approved));
    }

    let mut deductions = Vec::new();
    if before.leave_type.deducts_balance() {
        let mut rows = valid_rows(
            employees::lock_history(&mut tx, &before.employee_num, before.year).await?,
            before.year,
        );
        let mut balances = balances_of(&rows)?;
        // nothing has been written yet, so an error here leaves every row as it was
        deductions = deduction::deduct(&mut balances, before.days_requested, policy.deduction_policy)?;
        write_back(&mut rows, &balances);
        for row in &rows {
            employees::save_balances(&mut *tx, row).await?;
        }

        let days = usage_days(before.start_date, before.end_date, before.unit, before.days_requested);
        let charged = charge_days(&days, &deductions);
        usage_details::insert_for_request(&mut tx, &before.employee_num, before.year, id, &charged).await?;
    }

    let moved = leave_requests::transition(
        &mut *tx,
        id,
        LeaveStatus::Pending,
        LeaveStatus::Approved,
        actor.user_id,
        Some(&deductions),
    )
    .await?;
    if !moved {
        return Err(invalid_transition(before.status, LeaveStatus::Approved));
    }

    let after = leave_requests::find(&mut *tx, id).await?.ok_or_else(not_found)?;
    audit_log::insert(&mut *tx, &audit(actor, AuditAction::Approve, Some(&before), Some(&after), id)).await?;
    notifications::insert(&mut *tx, &decision_notice(&after, NotificationKind::LeaveApproved, "Leave approved")).await?;
    tx.commit().await?;

    invalidate_years(cache, &after).await;
    info!(leave_id = id, employee_num = %after.employee_num, deductions = ?after.deductions, "Leave approved");
    Ok(after)
}

#[instrument(name = "leave_reject", skip(pool, actor), fields(user_id = actor.user_id))]
pub async fn reject(pool: &MySqlPool, actor: &AuthUser, id: u64) -> ApiResult<LeaveRequest> {
    actor.require_manager()?;
    decide_without_balance(pool, actor, id, LeaveStatus::Rejected).await
}

#[instrument(name = "leave_cancel", skip(pool, actor), fields(user_id = actor.user_id))]
pub async fn cancel(pool: &MySqlPool, actor: &AuthUser, id: u64) -> ApiResult<LeaveRequest> {
    let current = leave_requests::find(pool, id).await?.ok_or_else(not_found)?;
    if !actor.is_manager() && current.requested_by != Some(actor.user_id) {
        return Err(ApiError::Forbidden("Only the requester or a manager can cancel".into()));
    }
    decide_without_balance(pool, actor, id, LeaveStatus::Cancelled).await
}

/// Pending → Rejected/Cancelled; balances are untouched.
async fn decide_without_balance(
    pool: &MySqlPool,
    actor: &AuthUser,
    id: u64,
    to: LeaveStatus,
) -> ApiResult<LeaveRequest> {
    let mut tx = pool.begin().await?;
    let before = leave_requests::lock(&mut tx, id).await?.ok_or_else(not_found)?;
    if !before.status.can_transition_to(to) {
        return Err(invalid_transition(before.status, to));
    }

    leave_requests::transition(&mut *tx, id, before.status, to, actor.user_id, None).await?;
    let after = leave_requests::find(&mut *tx, id).await?.ok_or_else(not_found)?;

    let (action, kind, title) = match to {
        LeaveStatus::Rejected => (AuditAction::Reject, NotificationKind::LeaveRejected, "Leave rejected"),
        _ => (AuditAction::Cancel, NotificationKind::LeaveCancelled, "Leave cancelled"),
    };
    audit_log::insert(&mut *tx, &audit(actor, action, Some(&before), Some(&after), id)).await?;
    if after.requested_by != Some(actor.user_id) {
        notifications::insert(&mut *tx, &decision_notice(&after, kind, title)).await?;
    }
    tx.commit().await?;

    info!(leave_id = id, status = %after.status, "Leave request closed");
    Ok(after)
}

/// Approved → Reverted, giving the deducted days back to the years they came from.
///
/// Days returned to a year whose close already ran expire as that close would
/// have expired them.
#[instrument(name = "leave_revert", skip(pool, policy, cache, actor), fields(user_id = actor.user_id))]
pub async fn revert(
    pool: &MySqlPool,
    policy: &LeavePolicy,
    cache: &SummaryCache,
    actor: &AuthUser,
    id: u64,
) -> ApiResult<LeaveRequest> {
    actor.require_manager()?;

    let mut tx = pool.begin().await?;
    let before = leave_requests::lock(&mut tx, id).await?.ok_or_else(not_found)?;
    if !before.status.can_transition_to(LeaveStatus::Reverted) {
        return Err(invalid_transition(before.status, LeaveStatus::Reverted));
    }

    let mut lapsed = Vec::new();
    if !before.deductions.is_empty() {
        let max_year = before.deductions.iter().map(|a| a.year).max().unwrap_or(before.year);
        // one year past the deductions, for the carried_over of a closed year's successor
        let mut rows = employees::lock_history(&mut tx, &before.employee_num, max_year + 1).await?;
        let closed_through = rows.iter().filter(|r| r.closed_at.is_some()).map(|r| r.year).max();
        let mut balances = balances_of(&rows)?;
        lapsed = carryover::restore_after_close(
            &mut balances,
            &before.deductions,
            closed_through,
            policy.carryover_cap_days,
        )?;
        write_back(&mut rows, &balances);
        if let Some(closed) = closed_through {
            let carried = balances.iter().find(|b| b.year == closed).map(|b| b.remaining());
            if let (Some(carried), Some(next)) = (carried, rows.iter_mut().find(|r| r.year == closed + 1)) {
                next.carried_over = carried;
            }
        }
        for row in &rows {
            employees::save_balances(&mut *tx, row).await?;
        }
    }
    let removed = usage_details::delete_for_request(&mut *tx, id).await?;

    leave_requests::transition(
        &mut *tx,
        id,
        LeaveStatus::Approved,
        LeaveStatus::Reverted,
        actor.user_id,
        None,
    )
    .await?;
    let after = leave_requests::find(&mut *tx, id).await?.ok_or_else(not_found)?;
    let mut entry = audit(actor, AuditAction::Revert, Some(&before), Some(&after), id);
    let mut notice = decision_notice(&after, NotificationKind::LeaveReverted, "Leave reverted");
    if !lapsed.is_empty() {
        let total: f64 = lapsed.iter().map(|a| a.days).sum();
        if let Some(serde_json::Value::Object(map)) = entry.new_value.as_mut() {
            map.insert("lapsed_on_revert".into(), serde_json::json!(lapsed));
        }
        notice.message.push_str(&format!("; {total} days returned to closed years expired"));
    }
    audit_log::insert(&mut *tx, &entry).await?;
    notifications::insert(&mut *tx, &notice).await?;
    tx.commit().await?;

    invalidate_years(cache, &before).await;
    if removed == 0 && before.leave_type.deducts_balance() {
        warn!(leave_id = id, "Reverted request had no usage detail rows");
    }
    info!(leave_id = id, employee_num = %after.employee_num, lapsed = ?lapsed, "Leave reverted");
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(year: i32) -> Employee {
        Employee {
            id: year as u64,
            employee_num: "E1".into(),
            year,
            name: "Sato".into(),
            haken: None,
            hire_date: None,
            grant_date: None,
            granted: 10.0,
            used: 0.0,
            expired: 0.0,
            balance: 10.0,
            carried_over: 0.0,
            usage_rate: 0.0,
            closed_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn only_current_and_previous_grants_are_usable() {
        let rows = vec![row(2022), row(2023), row(2024), row(2025)];
        let years: Vec<i32> = valid_rows(rows, 2024).iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2023, 2024]);
    }

    #[test]
    fn write_back_keeps_rows_consistent() {
        let mut rows = vec![row(2024), row(2025)];
        let mut balances = balances_of(&rows).unwrap();
        deduction::deduct(&mut balances, 12.0, crate::fiscal::DeductionPolicy::Lifo).unwrap();
        write_back(&mut rows, &balances);
        assert_eq!(rows[1].balance, 0.0);
        assert_eq!(rows[0].balance, 8.0);
        for r in &rows {
            assert_eq!(r.balance, r.granted - r.used - r.expired);
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, day).unwrap()
    }

    #[test]
    fn charged_days_split_across_grant_years() {
        let days = vec![(d(1), 1.0), (d(2), 1.0), (d(3), 1.0)];
        let plan = vec![
            Allocation { year: 2025, days: 1.5 },
            Allocation { year: 2024, days: 1.5 },
        ];
        let charged = charge_days(&days, &plan);
        let got: Vec<(NaiveDate, f64, i32)> =
            charged.iter().map(|c| (c.use_date, c.days_used, c.grant_year)).collect();
        assert_eq!(
            got,
            vec![(d(1), 1.0, 2025), (d(2), 0.5, 2025), (d(2), 0.5, 2024), (d(3), 1.0, 2024)]
        );
    }

    #[test]
    fn cross_year_fifo_approval_counts_once_in_the_year_taken() {
        use crate::fiscal::{ComplianceStatus, DeductionPolicy, balance::days_taken};
        use crate::services::{reconcile::reconciled, summary::compliance_entry};

        let mut rows = vec![row(2024), row(2025)];
        rows[0].granted = 11.0;
        rows[0].used = 6.0;
        rows[0].balance = 5.0;
        rows[1].granted = 12.0;
        rows[1].balance = 12.0;

        // five full days in May 2025, charged to fiscal 2025
        let mut balances = balances_of(&rows).unwrap();
        let plan = deduction::deduct(&mut balances, 5.0, DeductionPolicy::Fifo).unwrap();
        assert_eq!(plan, vec![Allocation { year: 2024, days: 5.0 }]);
        write_back(&mut rows, &balances);

        let days: Vec<(NaiveDate, f64)> = (1..=5).map(|n| (d(n), 1.0)).collect();
        let charged = charge_days(&days, &plan);
        assert!(charged.iter().all(|c| c.grant_year == 2024));

        // usage rows: the six 2024 days imported from the ledger, then this request
        let consumed = |year: i32| -> Option<f64> {
            let total: f64 = charged.iter().filter(|c| c.grant_year == year).map(|c| c.days_used).sum::<f64>()
                + if year == 2024 { 6.0 } else { 0.0 };
            (total > 0.0).then_some(total)
        };
        let taken_in = |year: i32| if year == 2025 { 5.0 } else { 6.0 };

        let r2025 = reconciled(&rows[1], consumed(2025)).unwrap();
        assert_eq!(r2025.used, 0.0);
        assert_eq!(r2025.remaining(), 12.0);
        let r2024 = reconciled(&rows[0], consumed(2024)).unwrap();
        assert_eq!(r2024.used, 11.0);
        assert_eq!(r2024.remaining(), 0.0);

        let taken_2025 = days_taken(rows[1].used, consumed(2025).unwrap_or(0.0), taken_in(2025));
        let entry = compliance_entry(&rows[1], taken_2025).unwrap();
        assert_eq!(entry.used, 5.0);
        assert_eq!(entry.status, ComplianceStatus::Compliant);

        let taken_2024 = days_taken(rows[0].used, consumed(2024).unwrap_or(0.0), taken_in(2024));
        assert_eq!(taken_2024, 6.0);
    }
}
