//! Configuration for the relay.
//!
//! Provides YAML-based configuration loading and validation for:
//! - The streaming transport endpoint and topic
//! - Collection jobs and their scrape targets
//! - The management HTTP server

mod app;
mod validation;

pub use app::{AppConfig, JobConfig, ManagementConfig, StreamConfig, TargetConfig};
pub use validation::ConfigError;

// Re-export constants
pub use app::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_SCRAPE_INTERVAL, DEFAULT_SCRAPE_TIMEOUT, MIN_SCRAPE_INTERVAL,
};
