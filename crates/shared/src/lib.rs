//! Shared library for the movie identifier.
//!
//! This crate provides the pieces every front end of the identification
//! pipeline needs:
//! - Configuration management
//! - Database handle and schema
//! - Domain models (file descriptors, metadata records, library rows)
//! - The persistent movie store
//! - Artifact path layout
//! - Logging infrastructure

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod paths;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use logging::LogConfig;
pub use models::*;
pub use paths::DataPaths;
pub use store::{LibraryStats, MovieStore, SqliteMovieStore, StoreWrite};

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
