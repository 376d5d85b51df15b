use crate::api::{
    audit::AuditListResponse,
    compliance::ComplianceReport,
    employee::{CreateEmployee, EmployeeFilters, EmployeeListResponse, UpdateEmployee},
    leave_request::LeaveListResponse,
    notification::NotificationListResponse,
    registry::RegistryListResponse,
    user::SetRole,
};
use crate::auth::handlers::Registered;
use crate::fiscal::{
    Allocation, ComplianceStatus, WorkPattern,
    carryover::ExpiringDays,
    compliance::{ComplianceCheck, ComplianceTally},
    grant::GrantPreview,
};
use crate::model::{
    audit_log::AuditEntry,
    employee::Employee,
    leave_request::{LeaveRequest, LeaveStatus, LeaveType, LeaveUnit},
    notification::Notification,
    registry::{RegistryCategory, RegistryEmployee},
    role::Role,
    usage_detail::UsageDetail,
};
use crate::models::{LoginReq, RegisterReq, TokenPair};
use crate::excel::RowIssue;
use crate::services::{
    leave::CreateLeave,
    reconcile::Reconciliation,
    summary::{ComplianceEntry, HakenStat, TopUser, YearSummary},
    sync::{CategorySync, RegistrySyncReport, SyncReport},
    year_end::{EmployeeCarryover, EmployeeExpiring, SkippedEmployee, YearEndReport},
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

/// Registers the `bearer_auth` scheme the protected paths refer to.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "YuKyu Leave API",
        version = "1.0.0",
        description = r#"
## Paid Leave (有給休暇) Management

Tracks statutory paid leave per employee and fiscal year under the Japanese
Labor Standards Act.

### 🔹 Key Features
- **Leave records**: granted, used, expired and balance per employee and year
- **Leave requests**: submit, approve, reject, cancel and revert, with LIFO or FIFO deduction across years
- **Compliance**: five-day obligation status (Art. 39(7))
- **Fiscal year**: grant preview, year-end carryover with a 40-day cap, expiring days
- **Sync**: import the leave ledger and employee registries from Excel; export CSV

### 🔐 Security
Endpoints under `/api/v1` need a **JWT Bearer** access token.
Approvals and reports are restricted to **Manager** and **Admin**; year-end runs to **Admin**.

### 📦 Response Format
- JSON responses; errors carry `code` and `message`
- Pagination on list endpoints (`page`, `per_page`)
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,
        crate::api::user::set_role,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::employee_filters,
        crate::api::employee::employee_history,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::usage_details,
        crate::api::employee::reconcile_employee,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave,
        crate::api::leave_request::revert_leave,

        crate::api::compliance::year_compliance,
        crate::api::compliance::employee_compliance,

        crate::api::fiscal::grant_preview,
        crate::api::fiscal::run_year_end,
        crate::api::fiscal::expiring,

        crate::api::dashboard::year_dashboard,

        crate::api::sync::sync_ledger,
        crate::api::sync::sync_registry,

        crate::api::export::export_year,

        crate::api::registry::list_registry,

        crate::api::notification::list_notifications,
        crate::api::notification::mark_read,
        crate::api::notification::mark_all_read,

        crate::api::audit::list_audit
    ),
    components(
        schemas(
            RegisterReq,
            LoginReq,
            TokenPair,
            Registered,
            Role,
            SetRole,
            Employee,
            CreateEmployee,
            UpdateEmployee,
            EmployeeListResponse,
            EmployeeFilters,
            UsageDetail,
            Reconciliation,
            LeaveRequest,
            LeaveStatus,
            LeaveType,
            LeaveUnit,
            Allocation,
            CreateLeave,
            LeaveListResponse,
            ComplianceStatus,
            ComplianceCheck,
            ComplianceTally,
            ComplianceEntry,
            ComplianceReport,
            WorkPattern,
            GrantPreview,
            ExpiringDays,
            EmployeeExpiring,
            EmployeeCarryover,
            SkippedEmployee,
            YearEndReport,
            YearSummary,
            HakenStat,
            TopUser,
            RowIssue,
            SyncReport,
            CategorySync,
            RegistrySyncReport,
            RegistryCategory,
            RegistryEmployee,
            RegistryListResponse,
            Notification,
            NotificationListResponse,
            AuditEntry,
            AuditListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Accounts, tokens and roles"),
        (name = "Employee", description = "Per-year leave records"),
        (name = "Leave", description = "Leave request workflow"),
        (name = "Compliance", description = "Five-day obligation reports"),
        (name = "Fiscal", description = "Grant schedule, year-end carryover and expiry"),
        (name = "Dashboard", description = "Year statistics"),
        (name = "Sync", description = "Excel ledger and registry import"),
        (name = "Export", description = "CSV export"),
        (name = "Registry", description = "Employee master data"),
        (name = "Notification", description = "In-app notifications"),
        (name = "Audit", description = "Change history"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_bearer_scheme_and_leave_paths() {
        let doc = ApiDoc::openapi();
        let components = doc.components.as_ref().unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/api/v1/leave/{leave_id}/revert"));
        assert!(doc.paths.paths.contains_key("/api/v1/fiscal/year-end/{year}"));
    }
}
