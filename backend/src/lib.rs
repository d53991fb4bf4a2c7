pub mod agents;
pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
pub mod services;
