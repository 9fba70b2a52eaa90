//! pulsebridge - scrape-to-stream relay
//!
//! Relays measurement batches from many independent collection jobs to a
//! durable streaming transport, decoupling collection cadence from delivery
//! and surviving transient transport outages.
//!
//! # Architecture
//!
//! - **Pollers**: one task per collection job, fetching targets on an interval
//! - **Outbox**: bounded hand-off queue applying backpressure to pollers
//! - **Pipeline**: single dispatcher owning the transport session, with a
//!   coalescing reconnect signal and an operator-facing circuit breaker
//! - **Transport**: pluggable connector/session seam with a TCP client
//! - **Server**: management HTTP surface (status, breaker, prometheus metrics)

pub mod config;
pub mod metrics;
pub mod outbox;
pub mod pipeline;
pub mod poller;
pub mod record;
pub mod server;
pub mod transport;

pub use config::AppConfig;
pub use metrics::PipelineMetrics;
pub use outbox::Outbox;
pub use pipeline::{Pipeline, PipelineError, PipelineHandle};
pub use record::Scrape;
