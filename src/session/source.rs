//! Producer session
//!
//! State machine: Handshaking -> Streaming -> Closed.
//!
//! Streaming reads chunks with a short bounded wait and enqueues them for
//! broadcast. Producer liveness is a single last-activity timestamp checked
//! against two thresholds each iteration: past the soft timeout the
//! streampoint is logged as stalled but the session keeps running; past the
//! (much larger) reconnect deadline the session is torn down. Only a
//! deadline breach, a transport error, or an externally removed slot ends
//! the loop; a quiet upstream on its own never does.
//!
//! Closed always runs the same cleanup: the producer slot and every
//! listener of the streampoint are removed, so clients fail fast and can
//! reconnect instead of waiting on a dead upstream.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;

use crate::broadcast::StreamChunk;
use crate::config::{RelayConfig, READ_BUFFER_SIZE};
use crate::protocol;
use crate::registry::{Registry, RegistryError};
use crate::sink::ChunkSink;

/// Why a streaming loop ended
enum Exit {
    /// Hard reconnect deadline exceeded
    Timeout,
    /// Read error on the producer socket
    Transport(std::io::Error),
    /// Producer slot removed externally (admin cascade)
    SlotGone,
    /// Broadcast queue closed (dispatcher gone)
    QueueClosed,
}

/// One producer connection
pub struct SourceSession {
    session_id: u64,
    registry: Arc<Registry>,
    config: RelayConfig,
    queue: mpsc::Sender<StreamChunk>,
}

impl SourceSession {
    pub fn new(
        session_id: u64,
        registry: Arc<Registry>,
        config: RelayConfig,
        queue: mpsc::Sender<StreamChunk>,
    ) -> Self {
        Self {
            session_id,
            registry,
            config,
            queue,
        }
    }

    /// Drive the session to completion
    ///
    /// `password` and `streampoint` come from the already-parsed SOURCE
    /// line; any payload that arrived in the same initial read as the
    /// handshake line is discarded, the stream starts with the next read.
    pub async fn run(
        self,
        mut reader: OwnedReadHalf,
        sink: Arc<dyn ChunkSink>,
        password: String,
        streampoint: String,
    ) {
        if !self.handshake(&sink, &password, &streampoint).await {
            return;
        }

        let exit = self.stream(&mut reader, &streampoint).await;
        match exit {
            Exit::Timeout => tracing::warn!(
                session_id = self.session_id,
                streampoint = %streampoint,
                "Source timed out"
            ),
            Exit::Transport(e) => tracing::debug!(
                session_id = self.session_id,
                streampoint = %streampoint,
                error = %e,
                "Source connection lost"
            ),
            Exit::SlotGone => tracing::debug!(
                session_id = self.session_id,
                streampoint = %streampoint,
                "Source slot removed externally"
            ),
            Exit::QueueClosed => tracing::debug!(
                session_id = self.session_id,
                streampoint = %streampoint,
                "Broadcast queue closed"
            ),
        }

        // Closed: idempotent teardown of the slot and all listeners.
        self.registry.drop_source(&streampoint).await;
        tracing::info!(
            session_id = self.session_id,
            streampoint = %streampoint,
            "Source session closed"
        );
    }

    /// Handshaking state; returns false if the session was rejected
    async fn handshake(
        &self,
        sink: &Arc<dyn ChunkSink>,
        password: &str,
        streampoint: &str,
    ) -> bool {
        if password != self.config.source_password {
            tracing::debug!(
                session_id = self.session_id,
                streampoint = %streampoint,
                "Source rejected: bad password"
            );
            let _ = sink.write_chunk(protocol::ERR_INVALID_SOURCE).await;
            sink.shutdown().await;
            return false;
        }

        match self
            .registry
            .register_source(streampoint, Arc::clone(sink))
            .await
        {
            Ok(()) => {}
            Err(RegistryError::SourceBusy(_)) => {
                tracing::debug!(
                    session_id = self.session_id,
                    streampoint = %streampoint,
                    "Source rejected: streampoint in use"
                );
                let _ = sink.write_chunk(protocol::ERR_POINT_IN_USE).await;
                sink.shutdown().await;
                return false;
            }
            Err(_) => {
                tracing::debug!(
                    session_id = self.session_id,
                    streampoint = %streampoint,
                    "Source rejected: unknown streampoint"
                );
                let _ = sink.write_chunk(protocol::ERR_INVALID_SOURCE).await;
                sink.shutdown().await;
                return false;
            }
        }

        if sink.write_chunk(protocol::REPLY_SOURCE_OK).await.is_err() {
            // Peer vanished before the ack; release the slot right away.
            self.registry.drop_source(streampoint).await;
            return false;
        }

        tracing::info!(
            session_id = self.session_id,
            streampoint = %streampoint,
            "Source streaming"
        );
        true
    }

    /// Streaming state
    async fn stream(&self, reader: &mut OwnedReadHalf, streampoint: &str) -> Exit {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut stalled = false;

        loop {
            match self.registry.source_idle(streampoint).await {
                None => return Exit::SlotGone,
                Some(idle) => {
                    if idle > self.config.reconnect_deadline {
                        return Exit::Timeout;
                    }
                    if idle > self.config.soft_timeout {
                        if !stalled {
                            tracing::warn!(
                                session_id = self.session_id,
                                streampoint = %streampoint,
                                idle_secs = idle.as_secs(),
                                "Source stalled, waiting for data"
                            );
                        }
                        stalled = true;
                    } else {
                        stalled = false;
                    }
                }
            }

            match tokio::time::timeout(self.config.read_timeout, reader.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    // EOF reads return instantly; the deadline check above
                    // ends the session, the rate-limit pause below keeps
                    // this from spinning.
                }
                Ok(Ok(n)) => {
                    self.registry.touch_source(streampoint).await;
                    let chunk = StreamChunk::new(streampoint, Bytes::copy_from_slice(&buf[..n]));
                    if self.queue.send(chunk).await.is_err() {
                        return Exit::QueueClosed;
                    }
                }
                Ok(Err(e)) => return Exit::Transport(e),
                Err(_) => {
                    // Read timeout: nothing to enqueue, last-activity
                    // untouched.
                }
            }

            tokio::time::sleep(self.config.rate_limit).await;
        }
    }
}
