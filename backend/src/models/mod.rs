//! Database models (SQLx).

pub mod connection;
pub mod mcp_cache;
pub mod organization;
pub mod payroll_risk;
pub mod rbac;
pub mod user;
