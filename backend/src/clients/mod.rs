pub mod llm;
pub mod provider;
pub mod quickbooks;
pub mod xero;
