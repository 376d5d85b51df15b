pub mod audit_log;
pub mod employee;
pub mod leave_request;
pub mod notification;
pub mod registry;
pub mod role;
pub mod usage_detail;
pub mod user;
