use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Context, bail};
use dotenvy::dotenv;

use crate::fiscal::DeductionPolicy;
use crate::fiscal::carryover::DEFAULT_CARRYOVER_CAP_DAYS;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,
    pub rate_upload_per_min: u32,

    /// Largest workbook accepted by the sync endpoints.
    pub max_upload_bytes: usize,

    pub api_prefix: String,
    pub log_dir: String,
    pub log_level: tracing::Level,
    pub summary_cache_ttl_secs: u64,

    pub leave: LeavePolicy,
}

/// Rules the fiscal year engine runs with.
#[derive(Clone, Debug, PartialEq)]
pub struct LeavePolicy {
    pub deduction_policy: DeductionPolicy,
    pub carryover_cap_days: f64,
    /// Month (1-12) on whose first day the fiscal year starts.
    pub fiscal_year_start_month: u32,
    /// Working hours that make up one leave day, for hourly requests.
    pub hours_per_day: f64,
    pub expiry_warning_days: i64,
}

impl Default for LeavePolicy {
    fn default() -> Self {
        Self {
            deduction_policy: DeductionPolicy::Lifo,
            carryover_cap_days: DEFAULT_CARRYOVER_CAP_DAYS,
            fiscal_year_start_month: 4,
            hours_per_day: 8.0,
            expiry_warning_days: 90,
        }
    }
}

impl LeavePolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=12).contains(&self.fiscal_year_start_month) {
            bail!(
                "FISCAL_YEAR_START_MONTH must be 1-12, got {}",
                self.fiscal_year_start_month
            );
        }
        if !(self.hours_per_day > 0.0 && self.hours_per_day <= 24.0) {
            bail!("HOURS_PER_DAY must be in (0, 24], got {}", self.hours_per_day);
        }
        if !self.carryover_cap_days.is_finite() || self.carryover_cap_days < 0.0 {
            bail!(
                "CARRYOVER_CAP_DAYS must be non-negative, got {}",
                self.carryover_cap_days
            );
        }
        if self.expiry_warning_days < 0 {
            bail!(
                "EXPIRY_WARNING_DAYS must be non-negative, got {}",
                self.expiry_warning_days
            );
        }
        Ok(())
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn var_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let defaults = LeavePolicy::default();
        let leave = LeavePolicy {
            deduction_policy: var_or("DEDUCTION_POLICY", defaults.deduction_policy)?,
            carryover_cap_days: var_or("CARRYOVER_CAP_DAYS", defaults.carryover_cap_days)?,
            fiscal_year_start_month: var_or(
                "FISCAL_YEAR_START_MONTH",
                defaults.fiscal_year_start_month,
            )?,
            hours_per_day: var_or("HOURS_PER_DAY", defaults.hours_per_day)?,
            expiry_warning_days: var_or("EXPIRY_WARNING_DAYS", defaults.expiry_warning_days)?,
        };
        leave.validate()?;

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: var_or("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: var_or("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: var_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: var_or("RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: var_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", 1000)?,
            rate_upload_per_min: var_or("RATE_UPLOAD_PER_MIN", 10)?,
            max_upload_bytes: var_or("MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,

            api_prefix: var_or("API_PREFIX", "/api/v1".to_string())?,
            log_dir: var_or("LOG_DIR", "logs".to_string())?,
            log_level: var_or("LOG_LEVEL", tracing::Level::INFO)?,
            summary_cache_ttl_secs: var_or("SUMMARY_CACHE_TTL_SECS", 300)?,

            leave,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/yukyu_test".into(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            rate_login_per_min: 60,
            rate_register_per_min: 30,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            rate_upload_per_min: 10,
            max_upload_bytes: 1024 * 1024,
            api_prefix: "/api/v1".into(),
            log_dir: "logs".into(),
            log_level: tracing::Level::DEBUG,
            summary_cache_ttl_secs: 60,
            leave: LeavePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(LeavePolicy::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_start_month() {
        let policy = LeavePolicy {
            fiscal_year_start_month: 13,
            ..LeavePolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn rejects_zero_hour_days() {
        let policy = LeavePolicy {
            hours_per_day: 0.0,
            ..LeavePolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
