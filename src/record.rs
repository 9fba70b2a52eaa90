//! The scrape record moved through the publishing pipeline.
//!
//! One record holds a single measurement batch fetched from one target of
//! one collection job, stamped with the capture time and the identity of
//! the relay that produced it.

use serde::{Deserialize, Serialize};

/// One scraped measurement batch, immutable once enqueued.
///
/// The wire representation is a JSON object. Field names are part of the
/// contract with downstream consumers: `timestamp` travels as `time`, and
/// the payload bytes keep the plain field name `scrape` with no rename, so
/// existing consumers keep decoding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scrape {
    /// Name of the collection job this batch belongs to.
    pub job: String,

    /// Identifier of the scraped target instance (e.g. `host:port`).
    pub instance: String,

    /// Capture time, seconds since the Unix epoch.
    #[serde(rename = "time")]
    pub timestamp: i64,

    /// Identity of the relay instance that produced this record.
    pub publisher: String,

    /// Raw measurement batch as fetched from the target.
    pub scrape: Vec<u8>,
}

impl Scrape {
    /// Create a record stamped with the current time.
    pub fn new(
        job: impl Into<String>,
        instance: impl Into<String>,
        publisher: impl Into<String>,
        scrape: Vec<u8>,
    ) -> Self {
        Self {
            job: job.into(),
            instance: instance.into(),
            timestamp: chrono::Utc::now().timestamp(),
            publisher: publisher.into(),
            scrape,
        }
    }
}
