//! TCP stream transport client.
//!
//! Frames are a 4-byte big-endian length prefix followed by a JSON body
//! carrying the topic and payload. A background reader task watches the
//! connection and fires the disconnect callback once when the peer closes
//! the socket or the read side errors.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use super::{Connector, DisconnectHandler, Session, TransportError};

/// Default session establishment timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One wire frame: topic plus the already-serialized record bytes.
#[derive(Serialize)]
struct Frame<'a> {
    topic: &'a str,
    payload: &'a [u8],
}

/// Connector for the TCP stream transport.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Create a connector for the given `host:port` address.
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Session = TcpSession;

    async fn connect(
        &self,
        on_disconnect: DisconnectHandler,
    ) -> Result<Self::Session, TransportError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                addr: self.addr.clone(),
            })?
            .map_err(|source| TransportError::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(watch_disconnect(read_half, on_disconnect));

        tracing::info!(addr = %self.addr, "Stream connection established");

        Ok(TcpSession {
            writer: BufWriter::new(write_half),
        })
    }
}

/// Read-side watchdog: the server sends nothing under normal operation, so
/// any read completion means the session is gone. Fires the disconnect
/// handler exactly once, then exits.
async fn watch_disconnect(mut read_half: OwnedReadHalf, on_disconnect: DisconnectHandler) {
    let mut buf = [0u8; 512];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                on_disconnect(TransportError::Closed);
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                on_disconnect(TransportError::Io(e));
                return;
            }
        }
    }
}

/// An established TCP session. Publishing writes one length-prefixed frame
/// per record and flushes.
pub struct TcpSession {
    writer: BufWriter<OwnedWriteHalf>,
}

#[async_trait]
impl Session for TcpSession {
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let body = serde_json::to_vec(&Frame { topic, payload })?;
        let len = body.len() as u32;

        self.writer.write_all(&len.to_be_bytes()).await?;
        self.writer.write_all(&body).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

impl std::fmt::Debug for TcpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSession").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn noop_handler() -> DisconnectHandler {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 is essentially never listening; refused or timed out,
        // either way connect must fail.
        let connector = TcpConnector::new("127.0.0.1:1", Duration::from_secs(1));
        let result = connector.connect(noop_handler()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_publish_writes_length_prefixed_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let connector = TcpConnector::new(addr.to_string(), DEFAULT_CONNECT_TIMEOUT);
        let mut session = connector.connect(noop_handler()).await.unwrap();

        let (mut server_side, _) = listener.accept().await.unwrap();
        session.publish("scrapes", b"hello").await.unwrap();

        let mut len_buf = [0u8; 4];
        server_side.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut body = vec![0u8; len];
        server_side.read_exact(&mut body).await.unwrap();

        let frame: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(frame["topic"], "scrapes");
        assert_eq!(
            frame["payload"],
            serde_json::json!([104, 101, 108, 108, 111])
        );
    }

    #[tokio::test]
    async fn test_disconnect_handler_fires_once_on_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let handler: DisconnectHandler = {
            let fired = Arc::clone(&fired);
            Arc::new(move |_reason| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };

        let connector = TcpConnector::new(addr.to_string(), DEFAULT_CONNECT_TIMEOUT);
        let _session = connector.connect(handler).await.unwrap();

        let (server_side, _) = listener.accept().await.unwrap();
        drop(server_side);

        // Give the watchdog a moment to observe the close.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
