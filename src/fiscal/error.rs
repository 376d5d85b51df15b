use derive_more::Display;

/// Failures raised by the fiscal year engine.
///
/// Compliance shortfalls are not errors; see [`super::compliance::ComplianceStatus`].
#[derive(Debug, Clone, PartialEq, Display)]
pub enum FiscalError {
    #[display(fmt = "invalid input: {}", _0)]
    InvalidInput(String),

    #[display(
        fmt = "insufficient balance: requested {} days but only {} available",
        requested,
        available
    )]
    InsufficientBalance { requested: f64, available: f64 },
}

impl std::error::Error for FiscalError {}

impl FiscalError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        FiscalError::InvalidInput(msg.into())
    }
}

pub type FiscalResult<T> = Result<T, FiscalError>;

/// Rejects NaN, infinities and negatives.
pub(crate) fn ensure_non_negative(field: &str, value: f64) -> FiscalResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(FiscalError::invalid(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}
