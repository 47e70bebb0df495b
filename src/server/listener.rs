//! Relay server
//!
//! Accept loop and protocol dispatch. One listening port accepts both
//! roles; each accepted socket gets its own task that performs a single
//! initial read, classifies the first line, and hands the connection to
//! the matching session.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};

use crate::broadcast::StreamChunk;
use crate::config::{RelayConfig, READ_BUFFER_SIZE};
use crate::error::Result;
use crate::protocol::{self, FirstLine};
use crate::registry::Registry;
use crate::session::{ListenerSession, SourceSession};
use crate::sink::TcpSink;

/// The relay's TCP front end
pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<Registry>,
    queue: mpsc::Sender<StreamChunk>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a server over an existing registry and broadcast queue
    pub fn new(
        config: RelayConfig,
        registry: Arc<Registry>,
        queue: mpsc::Sender<StreamChunk>,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            registry,
            queue,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Bind the configured address
    pub async fn listen(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "Relay listening");
        Ok(listener)
    }

    /// Run the server; blocks until shut down
    pub async fn run(&self) -> Result<()> {
        let listener = self.listen().await?;
        self.serve(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = self.listen().await?;
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(&listener) => result,
        }
    }

    /// Accept loop over an already-bound listener
    pub async fn serve(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Connection limit: the permit lives as long as the session task.
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(session_id = session_id, error = %e, "set_nodelay failed");
            }
        }

        let config = self.config.clone();
        let registry = Arc::clone(&self.registry);
        let queue = self.queue.clone();

        tokio::spawn(async move {
            let _permit = permit;
            dispatch(session_id, config, registry, queue, socket).await;
            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}

/// Read the initial buffer once, classify the first line, route
///
/// Read errors and aborts on a fresh connection are swallowed; only a
/// recognizable-but-wrong first line earns a protocol-error reply.
async fn dispatch(
    session_id: u64,
    config: RelayConfig,
    registry: Arc<Registry>,
    queue: mpsc::Sender<StreamChunk>,
    mut socket: TcpStream,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let n = match socket.read(&mut buf).await {
        Ok(0) => return,
        Ok(n) => n,
        Err(e) => {
            tracing::debug!(session_id = session_id, error = %e, "Initial read failed");
            return;
        }
    };
    let initial = &buf[..n];

    match protocol::classify(initial) {
        FirstLine::Source {
            password,
            streampoint,
        } => {
            let (reader, writer) = socket.into_split();
            let sink = Arc::new(TcpSink::new(writer));
            SourceSession::new(session_id, registry, config, queue)
                .run(reader, sink, password, streampoint)
                .await;
        }
        FirstLine::Get { streampoint } => {
            // The read half is dropped: from here on the socket is
            // write-only, driven by broadcast fan-out.
            let (_reader, writer) = socket.into_split();
            let sink = Arc::new(TcpSink::new(writer));
            ListenerSession::new(session_id, registry)
                .run(initial, streampoint, sink)
                .await;
        }
        FirstLine::Invalid => {
            tracing::debug!(session_id = session_id, "Invalid protocol line");
            let _ = socket.write_all(protocol::ERR_INVALID_PROTOCOL).await;
        }
    }
}
