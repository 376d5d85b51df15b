//! Fiscal year leave engine.
//!
//! Pure arithmetic over per-year balances; callers load rows, run these
//! functions and persist the result inside their own transaction.

pub mod balance;
pub mod calendar;
pub mod carryover;
pub mod compliance;
pub mod deduction;
pub mod error;
pub mod grant;

pub use balance::YearBalance;
pub use compliance::ComplianceStatus;
pub use deduction::{Allocation, DeductionPolicy};
pub use error::{FiscalError, FiscalResult};
pub use grant::WorkPattern;
