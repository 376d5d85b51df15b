use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::{FiscalError, FiscalResult, ensure_non_negative};

/// Slack allowed when comparing day totals that went through half-day or hourly arithmetic.
pub const DAY_EPSILON: f64 = 1e-9;

/// Leave held from one fiscal year's grant.
///
/// `remaining()` is always `granted - used - expired`; every mutation keeps that
/// non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct YearBalance {
    #[schema(example = 2025)]
    pub year: i32,
    #[schema(example = 11.0)]
    pub granted: f64,
    #[schema(example = 3.5)]
    pub used: f64,
    #[schema(example = 0.0)]
    pub expired: f64,
}

impl YearBalance {
    pub fn new(year: i32, granted: f64, used: f64, expired: f64) -> FiscalResult<Self> {
        ensure_non_negative("granted", granted)?;
        ensure_non_negative("used", used)?;
        ensure_non_negative("expired", expired)?;

        if used + expired > granted + DAY_EPSILON {
            return Err(FiscalError::invalid(format!(
                "year {year}: used ({used}) plus expired ({expired}) exceeds granted ({granted})"
            )));
        }

        Ok(Self {
            year,
            granted,
            used,
            expired,
        })
    }

    pub fn remaining(&self) -> f64 {
        let left = self.granted - self.used - self.expired;
        if left.abs() < DAY_EPSILON { 0.0 } else { left }
    }

    /// Percentage of the grant already taken, two decimals.
    pub fn usage_rate(&self) -> f64 {
        usage_rate(self.granted, self.used)
    }

    /// Marks whatever is left as expired and returns the amount.
    pub(crate) fn expire_all(&mut self) -> f64 {
        let left = self.remaining();
        self.expired += left;
        left
    }

    /// Marks up to `days` of the remainder as expired and returns the amount.
    pub(crate) fn expire(&mut self, days: f64) -> f64 {
        let take = days.min(self.remaining()).max(0.0);
        self.expired += take;
        take
    }
}

pub fn usage_rate(granted: f64, used: f64) -> f64 {
    if granted <= 0.0 {
        return 0.0;
    }
    (used / granted * 10_000.0).round() / 100.0
}

/// Sum of what is left across all rows.
pub fn total_remaining(balances: &[YearBalance]) -> f64 {
    balances.iter().map(YearBalance::remaining).sum()
}

/// Picks the authoritative used total for a year.
///
/// Usage detail rows win whenever any exist; the ledger figure is only kept for
/// years that were imported without per-day detail.
pub fn resolve_used(ledger_used: f64, detail_total: Option<f64>) -> f64 {
    match detail_total {
        Some(total) => total,
        None => ledger_used,
    }
}

/// Days taken during one fiscal year.
///
/// Dated usage rows count toward the year they fall in, whichever grant they
/// were drawn from. The part of the row's used total with no usage rows behind
/// it (`ledger_used - consumed_detail`) is taken to have been used that year.
pub fn days_taken(ledger_used: f64, consumed_detail: f64, taken_detail: f64) -> f64 {
    taken_detail + (ledger_used - consumed_detail).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_follows_invariant() {
        let b = YearBalance::new(2024, 12.0, 4.5, 1.0).unwrap();
        assert_eq!(b.remaining(), 6.5);
    }

    #[test]
    fn rejects_overdrawn_rows() {
        let err = YearBalance::new(2024, 10.0, 8.0, 3.0).unwrap_err();
        assert!(matches!(err, FiscalError::InvalidInput(_)));
    }

    #[test]
    fn rejects_negative_values() {
        assert!(YearBalance::new(2024, -1.0, 0.0, 0.0).is_err());
        assert!(YearBalance::new(2024, 10.0, f64::NAN, 0.0).is_err());
    }

    #[test]
    fn usage_rate_rounds_to_two_places() {
        assert_eq!(usage_rate(12.0, 4.0), 33.33);
        assert_eq!(usage_rate(0.0, 0.0), 0.0);
    }

    #[test]
    fn detail_total_takes_precedence() {
        assert_eq!(resolve_used(7.0, Some(5.5)), 5.5);
        assert_eq!(resolve_used(7.0, None), 7.0);
        assert_eq!(resolve_used(7.0, Some(0.0)), 0.0);
    }

    #[test]
    fn days_taken_follows_the_calendar_not_the_grant() {
        // five days taken in the year, all drawn from last year's grant
        assert_eq!(days_taken(0.0, 0.0, 5.0), 5.0);
        // last year's row: 6 own days on record plus those 5 drawn from it later
        assert_eq!(days_taken(11.0, 11.0, 6.0), 6.0);
        // ledger total without any dated rows
        assert_eq!(days_taken(4.0, 0.0, 0.0), 4.0);
    }
}
