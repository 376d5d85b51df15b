use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Which employee master a registry row lives in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RegistryCategory {
    /// Dispatched workers (派遣社員).
    Genzai,
    /// Contract workers (請負社員).
    Ukeoi,
    /// Office staff.
    Staff,
}

impl RegistryCategory {
    /// Table backing the category. Only these fixed names ever reach SQL text.
    pub fn table(self) -> &'static str {
        match self {
            RegistryCategory::Genzai => "genzai",
            RegistryCategory::Ukeoi => "ukeoi",
            RegistryCategory::Staff => "staff",
        }
    }

    /// Default sheet name in the registry workbook.
    pub fn sheet_name(self) -> &'static str {
        match self {
            RegistryCategory::Genzai => "DBGenzaiX",
            RegistryCategory::Ukeoi => "DBUkeoiX",
            RegistryCategory::Staff => "DBStaffX",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct RegistryEmployee {
    pub id: u64,
    #[schema(example = "E1024")]
    pub employee_num: String,
    pub name: String,
    pub kana: Option<String>,
    pub haken: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub hire_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub leave_date: Option<NaiveDate>,
    #[schema(example = "active")]
    pub status: String,
    pub hourly_wage: Option<f64>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
