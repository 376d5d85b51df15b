pub mod audit;
pub mod compliance;
pub mod dashboard;
pub mod employee;
pub mod export;
pub mod fiscal;
pub mod leave_request;
pub mod notification;
pub mod registry;
pub mod sync;
pub mod user;
