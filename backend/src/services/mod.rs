pub mod cache_service;
pub mod connection_service;
pub mod event_bus;
pub mod organization_service;
pub mod payroll_risk_service;
pub mod rbac_service;
pub mod scheduler_service;
pub mod token_cipher;
pub mod user_service;
