//! Shared types, errors, and configuration for Locus.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe node references
//! - Partition keys scoping every catalog to one tenant
//! - Pagination types for list queries
//! - Application-wide error types
//! - Configuration management and tracing setup

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
