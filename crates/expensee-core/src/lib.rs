//! Core library for the Expensee expense tracker client.
//!
//! - `api`: authenticated request pipeline and typed service client
//! - `auth`: credential storage and the session state container
//! - `config`: on-disk configuration with environment overrides
//! - `models`: wire types for users, expenses, budgets, categories,
//!   receipts and analytics

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, AuthPipeline, AuthenticationError};
pub use auth::{CredentialStore, SessionEvent, SessionStore};
pub use config::Config;
