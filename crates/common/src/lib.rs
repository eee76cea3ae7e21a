//! PeerDesk Common Library
//!
//! Shared code for the PeerDesk services including:
//! - Review workflow (paper aggregate, transition function, service)
//! - Identities, registration, and author resolution
//! - Database models, Postgres and in-memory repositories
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Manuscript storage and outgoing email
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
pub mod metrics;
pub mod notify;
pub mod review;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use review::ReviewWorkflow;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
