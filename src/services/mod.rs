//! Transactional operations that apply fiscal engine results to stored rows.

pub mod leave;
pub mod reconcile;
pub mod summary;
pub mod sync;
pub mod year_end;

use crate::error::{ApiError, ApiResult};
use crate::fiscal::YearBalance;
use crate::model::employee::Employee;

/// Engine view of stored rows, in the same order.
pub(crate) fn balances_of(rows: &[Employee]) -> ApiResult<Vec<YearBalance>> {
    rows.iter()
        .map(|row| {
            row.year_balance().map_err(|e| {
                tracing::error!(
                    employee_num = %row.employee_num,
                    year = row.year,
                    error = %e,
                    "Stored leave row violates balance invariant"
                );
                ApiError::from(e)
            })
        })
        .collect()
}

/// Copies engine results back onto the rows they came from.
pub(crate) fn write_back(rows: &mut [Employee], balances: &[YearBalance]) {
    for row in rows.iter_mut() {
        if let Some(b) = balances.iter().find(|b| b.year == row.year) {
            row.apply(b);
        }
    }
}
