//! ClaimForge Common Library
//!
//! Shared code for the ClaimForge services including:
//! - Domain types and closed enumerations
//! - Persistence gateway (store trait, Postgres and in-memory backends)
//! - Operation dispatcher for the data endpoint
//! - Error types and handling
//! - Configuration management

pub mod config;
pub mod errors;
pub mod gateway;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use gateway::{execute, Envelope, Operation};
pub use store::ClaimStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
