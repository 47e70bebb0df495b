//! Owned output handles for producer and listener sockets
//!
//! The registry stores write halves behind the [`ChunkSink`] trait so that
//! fan-out and cleanup never depend on a concrete socket type. Sinks are
//! shared as `Arc<dyn ChunkSink>`: the broadcast dispatcher writes through
//! them, cleanup shuts them down.

use std::io;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

/// An owned, shareable output handle
///
/// `write_chunk` must be atomic per call with respect to other writers on
/// the same sink; `shutdown` is idempotent and swallows close errors.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Write one chunk to the peer
    async fn write_chunk(&self, data: &[u8]) -> io::Result<()>;

    /// Close the handle, ignoring errors from an already-dead peer
    async fn shutdown(&self);
}

/// TCP-backed sink wrapping the write half of a split stream
pub struct TcpSink {
    inner: Mutex<OwnedWriteHalf>,
}

impl TcpSink {
    pub fn new(half: OwnedWriteHalf) -> Self {
        Self {
            inner: Mutex::new(half),
        }
    }
}

#[async_trait]
impl ChunkSink for TcpSink {
    async fn write_chunk(&self, data: &[u8]) -> io::Result<()> {
        let mut half = self.inner.lock().await;
        half.write_all(data).await?;
        half.flush().await
    }

    async fn shutdown(&self) {
        let _ = self.inner.lock().await.shutdown().await;
    }
}
