//! Five-day obligation (Labor Standards Act Art. 39(7)).

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

use super::error::{FiscalResult, ensure_non_negative};

/// Grants of at least this many days carry the obligation.
pub const OBLIGATION_THRESHOLD_DAYS: f64 = 10.0;
/// Days that must be taken within the year.
pub const REQUIRED_DAYS: f64 = 5.0;
const AT_RISK_FLOOR_DAYS: f64 = 3.0;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    /// 3 to under 5 days taken.
    AtRisk,
    /// Something taken, under 3 days.
    HighRisk,
    /// Nothing taken.
    Critical,
    /// Granted under 10 days.
    Exempt,
}

impl ComplianceStatus {
    /// Whether the row should be surfaced as a violation risk.
    pub fn is_violation_risk(self) -> bool {
        matches!(
            self,
            ComplianceStatus::AtRisk | ComplianceStatus::HighRisk | ComplianceStatus::Critical
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComplianceCheck {
    pub status: ComplianceStatus,
    #[schema(example = 12.0)]
    pub granted: f64,
    #[schema(example = 4.0)]
    pub used: f64,
    /// Days still needed to reach five; zero when compliant or exempt.
    #[schema(example = 1.0)]
    pub days_needed: f64,
}

pub fn classify(granted: f64, used: f64) -> FiscalResult<ComplianceStatus> {
    ensure_non_negative("granted", granted)?;
    ensure_non_negative("used", used)?;

    let status = if granted < OBLIGATION_THRESHOLD_DAYS {
        ComplianceStatus::Exempt
    } else if used >= REQUIRED_DAYS {
        ComplianceStatus::Compliant
    } else if used >= AT_RISK_FLOOR_DAYS {
        ComplianceStatus::AtRisk
    } else if used > 0.0 {
        ComplianceStatus::HighRisk
    } else {
        ComplianceStatus::Critical
    };
    Ok(status)
}

pub fn check(granted: f64, used: f64) -> FiscalResult<ComplianceCheck> {
    let status = classify(granted, used)?;
    let days_needed = match status {
        ComplianceStatus::Compliant | ComplianceStatus::Exempt => 0.0,
        _ => REQUIRED_DAYS - used,
    };
    Ok(ComplianceCheck {
        status,
        granted,
        used,
        days_needed,
    })
}

/// Per-status tally for one fiscal year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComplianceTally {
    pub compliant: u32,
    pub at_risk: u32,
    pub high_risk: u32,
    pub critical: u32,
    pub exempt: u32,
}

impl ComplianceTally {
    pub fn record(&mut self, status: ComplianceStatus) {
        match status {
            ComplianceStatus::Compliant => self.compliant += 1,
            ComplianceStatus::AtRisk => self.at_risk += 1,
            ComplianceStatus::HighRisk => self.high_risk += 1,
            ComplianceStatus::Critical => self.critical += 1,
            ComplianceStatus::Exempt => self.exempt += 1,
        }
    }

    /// Employees carrying the obligation.
    pub fn obligated(&self) -> u32 {
        self.compliant + self.at_risk + self.high_risk + self.critical
    }

    /// Share of obligated employees already compliant, in percent.
    pub fn compliance_rate(&self) -> f64 {
        let obligated = self.obligated();
        if obligated == 0 {
            return 100.0;
        }
        (self.compliant as f64 / obligated as f64 * 10_000.0).round() / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn classifies_by_days_taken() {
        assert_eq!(classify(12.0, 4.0).unwrap(), ComplianceStatus::AtRisk);
        assert_eq!(classify(12.0, 0.0).unwrap(), ComplianceStatus::Critical);
        assert_eq!(classify(8.0, 0.0).unwrap(), ComplianceStatus::Exempt);
        assert_eq!(classify(10.0, 5.0).unwrap(), ComplianceStatus::Compliant);
        assert_eq!(classify(20.0, 3.0).unwrap(), ComplianceStatus::AtRisk);
        assert_eq!(classify(20.0, 2.0).unwrap(), ComplianceStatus::HighRisk);
        assert_eq!(classify(20.0, 0.5).unwrap(), ComplianceStatus::HighRisk);
    }

    #[test]
    fn reports_days_still_needed() {
        assert_eq!(check(12.0, 3.5).unwrap().days_needed, 1.5);
        assert_eq!(check(12.0, 6.0).unwrap().days_needed, 0.0);
        assert_eq!(check(7.0, 0.0).unwrap().days_needed, 0.0);
    }

    #[test]
    fn rejects_negative_usage() {
        assert!(classify(12.0, -1.0).is_err());
    }

    #[test]
    fn tally_counts_and_rate() {
        let mut tally = ComplianceTally::default();
        for status in ComplianceStatus::iter() {
            tally.record(status);
        }
        tally.record(ComplianceStatus::Compliant);
        assert_eq!(tally.obligated(), 5);
        assert_eq!(tally.compliance_rate(), 40.0);
        assert_eq!(ComplianceTally::default().compliance_rate(), 100.0);
    }

    #[test]
    fn status_strings_match_storage_format() {
        assert_eq!(ComplianceStatus::HighRisk.to_string(), "HIGH_RISK");
        assert_eq!("AT_RISK".parse::<ComplianceStatus>().unwrap(), ComplianceStatus::AtRisk);
    }
}
