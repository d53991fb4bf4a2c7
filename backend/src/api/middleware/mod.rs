pub mod auth;
pub mod demo;
