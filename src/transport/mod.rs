//! Streaming transport boundary.
//!
//! The pipeline only ever sees two things: a connector that opens a session
//! and installs a disconnect callback, and a session that publishes bytes to
//! a topic. Everything behind those traits (wire protocol, framing,
//! authentication) is the transport client's business.

mod tcp;

pub use tcp::{TcpConnector, TcpSession};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Session establishment failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Session establishment did not complete in time.
    #[error("connect to {addr} timed out")]
    ConnectTimeout { addr: String },

    /// I/O failure on an established session.
    #[error("stream i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the session.
    #[error("connection closed by peer")]
    Closed,

    /// A frame could not be encoded for the wire.
    #[error("frame encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Callback invoked by the transport client when an established session
/// drops, carrying the reason.
///
/// Runs on the transport client's own task, so it must be non-blocking and
/// must not attempt to reconnect itself.
pub type DisconnectHandler = Arc<dyn Fn(TransportError) + Send + Sync>;

/// Opens sessions with the streaming transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Session type produced by this connector.
    type Session: Session;

    /// Establish a session and register `on_disconnect` to be invoked when
    /// it drops. A failed connect is not retried here; the caller decides
    /// whether that is fatal.
    async fn connect(
        &self,
        on_disconnect: DisconnectHandler,
    ) -> Result<Self::Session, TransportError>;
}

/// An established transport session, owned by exactly one task at a time.
#[async_trait]
pub trait Session: Send + 'static {
    /// Publish one message to the given topic.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
}
