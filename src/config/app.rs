//! Application configuration structures.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::ConfigError;
use crate::outbox::DEFAULT_OUTBOX_CAPACITY;

// =============================================================================
// Constants
// =============================================================================

/// Default scrape interval (30 seconds).
pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum allowed scrape interval (1 second).
pub const MIN_SCRAPE_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-target fetch timeout (10 seconds).
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default stream connect timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_interval() -> Duration {
    DEFAULT_SCRAPE_INTERVAL
}

fn default_scrape_timeout() -> Duration {
    DEFAULT_SCRAPE_TIMEOUT
}

fn default_outbox_capacity() -> usize {
    DEFAULT_OUTBOX_CAPACITY
}

fn default_publisher() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "pulsebridge".to_string())
}

// =============================================================================
// Management Configuration
// =============================================================================

/// Management HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementConfig {
    /// Listen address (default: "0.0.0.0:8080").
    pub listen: String,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

// =============================================================================
// Stream Configuration
// =============================================================================

/// Streaming transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Transport endpoint as `host:port`.
    pub url: String,

    /// Topic every scrape record is published to.
    pub topic: String,

    /// Session establishment timeout (default: 10s).
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
}

// =============================================================================
// Job Configuration
// =============================================================================

/// One scrape target within a collection job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Instance identifier stamped into every record (e.g. `host:port`).
    pub name: String,

    /// URL the measurement batch is fetched from.
    pub url: String,
}

/// One collection job: a set of targets scraped on a shared interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Scrape interval (default: 30s, minimum: 1s).
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Per-target fetch timeout (default: 10s).
    #[serde(default = "default_scrape_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Targets scraped by this job.
    pub targets: Vec<TargetConfig>,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Management HTTP server.
    #[serde(default)]
    pub management: ManagementConfig,

    /// Streaming transport endpoint and topic.
    pub stream: StreamConfig,

    /// Identity stamped into every published record
    /// (default: `$HOSTNAME`, falling back to "pulsebridge").
    #[serde(default = "default_publisher")]
    pub publisher: String,

    /// Outbox queue capacity (default: 1000).
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Collection jobs keyed by job name.
    #[serde(default)]
    pub jobs: BTreeMap<String, JobConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.management.listen.parse::<SocketAddr>().map_err(|_| {
            ConfigError::Validation(format!(
                "invalid management listen address: '{}'",
                self.management.listen
            ))
        })?;

        if self.stream.url.is_empty() {
            return Err(ConfigError::Validation(
                "stream url must not be empty".to_string(),
            ));
        }

        if self.stream.topic.is_empty() {
            return Err(ConfigError::Validation(
                "stream topic must not be empty".to_string(),
            ));
        }

        if self.publisher.is_empty() {
            return Err(ConfigError::Validation(
                "publisher must not be empty".to_string(),
            ));
        }

        if self.outbox_capacity == 0 {
            return Err(ConfigError::Validation(
                "outbox_capacity must be positive".to_string(),
            ));
        }

        for (name, job) in &self.jobs {
            if job.targets.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "job '{name}' has no targets"
                )));
            }

            if job.interval < MIN_SCRAPE_INTERVAL {
                return Err(ConfigError::Validation(format!(
                    "job '{name}' interval must be at least {}s",
                    MIN_SCRAPE_INTERVAL.as_secs()
                )));
            }

            for target in &job.targets {
                if target.name.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "job '{name}' has a target with an empty name"
                    )));
                }
                if !target.url.starts_with("http://") && !target.url.starts_with("https://") {
                    return Err(ConfigError::Validation(format!(
                        "job '{name}' target '{}' has a non-HTTP url: '{}'",
                        target.name, target.url
                    )));
                }
            }
        }

        Ok(())
    }
}
