pub mod auth;
pub mod cache;
pub mod connections;
pub mod health;
pub mod oauth;
pub mod organizations;
pub mod payroll_risk;
pub mod rbac;
pub mod users;
