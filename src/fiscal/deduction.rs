use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::balance::{DAY_EPSILON, YearBalance, total_remaining};
use super::error::{FiscalError, FiscalResult};

/// Order in which multi-year balances are consumed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ToSchema,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum DeductionPolicy {
    /// Newest grant first.
    #[default]
    Lifo,
    /// Oldest grant first.
    Fifo,
}

/// Days taken from (or given back to) one grant year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Allocation {
    #[schema(example = 2025)]
    pub year: i32,
    #[schema(example = 1.5)]
    pub days: f64,
}

fn consumption_order(balances: &[YearBalance], policy: DeductionPolicy) -> Vec<usize> {
    let mut order: Vec<usize> = (0..balances.len()).collect();
    match policy {
        DeductionPolicy::Lifo => order.sort_by(|a, b| balances[*b].year.cmp(&balances[*a].year)),
        DeductionPolicy::Fifo => order.sort_by(|a, b| balances[*a].year.cmp(&balances[*b].year)),
    }
    order
}

/// Works out which years would cover `days` without touching anything.
pub fn plan_deduction(
    balances: &[YearBalance],
    days: f64,
    policy: DeductionPolicy,
) -> FiscalResult<Vec<Allocation>> {
    if !days.is_finite() || days <= 0.0 {
        return Err(FiscalError::invalid(format!(
            "days to deduct must be positive, got {days}"
        )));
    }

    let available = total_remaining(balances);
    if days > available + DAY_EPSILON {
        return Err(FiscalError::InsufficientBalance {
            requested: days,
            available,
        });
    }

    let mut outstanding = days;
    let mut plan = Vec::new();
    for idx in consumption_order(balances, policy) {
        if outstanding <= DAY_EPSILON {
            break;
        }
        let row = &balances[idx];
        let take = row.remaining().min(outstanding);
        if take <= 0.0 {
            continue;
        }
        plan.push(Allocation {
            year: row.year,
            days: take,
        });
        outstanding -= take;
    }

    Ok(plan)
}

/// Deducts `days` across `balances`. On error the slice is left untouched.
pub fn deduct(
    balances: &mut [YearBalance],
    days: f64,
    policy: DeductionPolicy,
) -> FiscalResult<Vec<Allocation>> {
    let plan = plan_deduction(balances, days, policy)?;
    for alloc in &plan {
        if let Some(row) = balances.iter_mut().find(|b| b.year == alloc.year) {
            row.used += alloc.days;
        }
    }
    Ok(plan)
}

/// Gives previously deducted days back to the years they came from.
///
/// Every allocation is checked before any row changes.
pub fn restore(balances: &mut [YearBalance], allocations: &[Allocation]) -> FiscalResult<()> {
    for alloc in allocations {
        let row = balances
            .iter()
            .find(|b| b.year == alloc.year)
            .ok_or_else(|| {
                FiscalError::invalid(format!("no balance row for year {}", alloc.year))
            })?;
        if !alloc.days.is_finite() || alloc.days < 0.0 || alloc.days > row.used + DAY_EPSILON {
            return Err(FiscalError::invalid(format!(
                "cannot restore {} days to year {} with {} used",
                alloc.days, alloc.year, row.used
            )));
        }
    }

    for alloc in allocations {
        if let Some(row) = balances.iter_mut().find(|b| b.year == alloc.year) {
            row.used = (row.used - alloc.days).max(0.0);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<YearBalance> {
        vec![
            YearBalance::new(2024, 11.0, 6.0, 0.0).unwrap(), // 5 left
            YearBalance::new(2025, 12.0, 2.0, 0.0).unwrap(), // 10 left
        ]
    }

    #[test]
    fn lifo_takes_newest_first() {
        let mut b = rows();
        let plan = deduct(&mut b, 12.0, DeductionPolicy::Lifo).unwrap();
        assert_eq!(
            plan,
            vec![
                Allocation { year: 2025, days: 10.0 },
                Allocation { year: 2024, days: 2.0 },
            ]
        );
        assert_eq!(b[1].remaining(), 0.0);
        assert_eq!(b[0].remaining(), 3.0);
    }

    #[test]
    fn fifo_takes_oldest_first() {
        let mut b = rows();
        let plan = deduct(&mut b, 6.5, DeductionPolicy::Fifo).unwrap();
        assert_eq!(
            plan,
            vec![
                Allocation { year: 2024, days: 5.0 },
                Allocation { year: 2025, days: 1.5 },
            ]
        );
        assert_eq!(b[1].remaining(), 8.5);
    }

    #[test]
    fn lifo_within_newest_year_only() {
        let mut b = rows();
        let plan = deduct(&mut b, 3.0, DeductionPolicy::Lifo).unwrap();
        assert_eq!(plan, vec![Allocation { year: 2025, days: 3.0 }]);
        assert_eq!(b[0].remaining(), 5.0);
    }

    #[test]
    fn overdraw_is_all_or_nothing() {
        let mut b = rows();
        let before = b.clone();
        let err = deduct(&mut b, 15.5, DeductionPolicy::Lifo).unwrap_err();
        assert_eq!(
            err,
            FiscalError::InsufficientBalance {
                requested: 15.5,
                available: 15.0
            }
        );
        assert_eq!(b, before);
    }

    #[test]
    fn rejects_non_positive_requests() {
        let mut b = rows();
        assert!(matches!(
            deduct(&mut b, 0.0, DeductionPolicy::Lifo),
            Err(FiscalError::InvalidInput(_))
        ));
        assert!(matches!(
            deduct(&mut b, -1.0, DeductionPolicy::Fifo),
            Err(FiscalError::InvalidInput(_))
        ));
    }

    #[test]
    fn restore_reverses_a_deduction() {
        let mut b = rows();
        let before = b.clone();
        let plan = deduct(&mut b, 12.0, DeductionPolicy::Lifo).unwrap();
        restore(&mut b, &plan).unwrap();
        assert_eq!(b, before);
    }

    #[test]
    fn restore_checks_every_row_first() {
        let mut b = rows();
        let before = b.clone();
        let bogus = vec![
            Allocation { year: 2025, days: 1.0 },
            Allocation { year: 2019, days: 1.0 },
        ];
        assert!(restore(&mut b, &bogus).is_err());
        assert_eq!(b, before);
    }

    #[test]
    fn invariant_holds_after_deduction() {
        let mut b = rows();
        deduct(&mut b, 7.5, DeductionPolicy::Fifo).unwrap();
        for row in &b {
            assert!((row.remaining() - (row.granted - row.used - row.expired)).abs() < 1e-9);
            assert!(row.remaining() >= 0.0);
        }
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!("fifo".parse::<DeductionPolicy>().unwrap(), DeductionPolicy::Fifo);
        assert_eq!(DeductionPolicy::Lifo.to_string(), "LIFO");
    }
}
