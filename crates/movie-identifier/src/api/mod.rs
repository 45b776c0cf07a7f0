//! TMDb API v3 client implementation.
//!
//! This module provides a rate-limited, retry-enabled client implementing
//! [`crate::lookup::LookupClient`] against The Movie Database.

pub mod client;
pub mod rate_limiter;
pub mod types;

pub use client::TmdbClient;
pub use rate_limiter::RateLimiter;
