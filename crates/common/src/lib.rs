//! Shared types, config, and error definitions for award-scout.

pub mod config;
pub mod error;
pub mod fetch;
pub mod types;

pub use config::ScoutConfig;
pub use error::Error;
pub use fetch::{FetchResolution, FetchStatus, MonthFetcher};
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
