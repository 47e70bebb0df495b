//! Broadcast queue and fan-out
//!
//! A single dispatch loop consumes the FIFO of `(streampoint, chunk)`
//! items that source sessions fill. Each popped item gets its own spawned
//! fan-out task, so a slow fan-out never stalls the next pop; the loop
//! pauses one rate-limit interval per iteration to bound its overhead.
//!
//! A fan-out task snapshots the streampoint's listener handles in one
//! consistent read, then writes the chunk to each of them sequentially.
//! Write failures mark the listener for removal but never abort delivery
//! to the rest; marked listeners are removed through the registry after
//! the pass. Chunk order within a streampoint follows producer order
//! because there is exactly one queue consumer.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::registry::Registry;

/// One queued broadcast item
///
/// Cheap to clone; the payload is reference-counted, every listener write
/// shares the same allocation.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub streampoint: String,
    pub data: Bytes,
}

impl StreamChunk {
    pub fn new(streampoint: impl Into<String>, data: Bytes) -> Self {
        Self {
            streampoint: streampoint.into(),
            data,
        }
    }
}

/// Single logical consumer of the broadcast queue
pub struct BroadcastDispatcher {
    registry: Arc<Registry>,
    rx: mpsc::Receiver<StreamChunk>,
    rate_limit: Duration,
    pop_timeout: Duration,
}

impl BroadcastDispatcher {
    /// Create the queue and its dispatcher
    ///
    /// The returned sender is cloned into every source session; the queue
    /// is bounded, so a stalled dispatcher backpressures producers instead
    /// of buffering without limit.
    pub fn channel(
        registry: Arc<Registry>,
        config: &RelayConfig,
    ) -> (mpsc::Sender<StreamChunk>, Self) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let dispatcher = Self {
            registry,
            rx,
            rate_limit: config.rate_limit,
            pop_timeout: config.queue_pop_timeout,
        };
        (tx, dispatcher)
    }

    /// Run the dispatch loop until every sender is gone
    pub async fn run(mut self) {
        tracing::debug!("Broadcast dispatcher started");
        loop {
            match tokio::time::timeout(self.pop_timeout, self.rx.recv()).await {
                Ok(Some(chunk)) => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        fan_out(&registry, chunk).await;
                    });
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::trace!("Broadcast queue idle");
                }
            }
            tokio::time::sleep(self.rate_limit).await;
        }
        tracing::debug!("Broadcast dispatcher stopped");
    }
}

/// Write one chunk to every current listener of a streampoint
pub(crate) async fn fan_out(registry: &Registry, chunk: StreamChunk) {
    let listeners = registry.listener_snapshot(&chunk.streampoint).await;
    if listeners.is_empty() {
        return;
    }
    tracing::trace!(
        streampoint = %chunk.streampoint,
        listeners = listeners.len(),
        bytes = chunk.data.len(),
        "Fan-out"
    );

    let mut disconnected = Vec::new();
    for (id, sink) in listeners {
        if let Err(e) = sink.write_chunk(&chunk.data).await {
            tracing::debug!(
                streampoint = %chunk.streampoint,
                listener_id = id,
                error = %e,
                "Listener write failed"
            );
            disconnected.push(id);
        }
    }

    for id in disconnected {
        registry.remove_listener(&chunk.streampoint, id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NoPersist;
    use crate::sink::testing::RecordingSink;

    async fn active_registry(streampoint: &str) -> Arc<Registry> {
        let reg = Arc::new(Registry::new(Arc::new(NoPersist)));
        reg.add_streampoint(streampoint).await.unwrap();
        reg.register_source(streampoint, RecordingSink::new())
            .await
            .unwrap();
        reg
    }

    #[tokio::test]
    async fn test_fan_out_reaches_all_listeners() {
        let reg = active_registry("radio1").await;
        let a = RecordingSink::new();
        let b = RecordingSink::new();
        reg.register_listener("radio1", None, a.clone()).await.unwrap();
        reg.register_listener("radio1", None, b.clone()).await.unwrap();

        fan_out(&reg, StreamChunk::new("radio1", Bytes::from_static(b"abc"))).await;

        assert_eq!(a.chunks().await, vec![b"abc".to_vec()]);
        assert_eq!(b.chunks().await, vec![b"abc".to_vec()]);
    }

    #[tokio::test]
    async fn test_failed_listener_removed_others_unaffected() {
        let reg = active_registry("radio1").await;
        let good = RecordingSink::new();
        let bad = RecordingSink::failing();
        reg.register_listener("radio1", None, good.clone())
            .await
            .unwrap();
        reg.register_listener("radio1", None, bad.clone()).await.unwrap();

        fan_out(&reg, StreamChunk::new("radio1", Bytes::from_static(b"one"))).await;
        assert_eq!(reg.listener_count("radio1").await, 1);
        assert!(bad.is_shut_down());

        // The survivor keeps receiving later chunks.
        fan_out(&reg, StreamChunk::new("radio1", Bytes::from_static(b"two"))).await;
        assert_eq!(good.chunks().await, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[tokio::test]
    async fn test_fan_out_no_listeners_is_noop() {
        let reg = active_registry("radio1").await;
        fan_out(&reg, StreamChunk::new("radio1", Bytes::from_static(b"x"))).await;
        fan_out(&reg, StreamChunk::new("ghost", Bytes::from_static(b"x"))).await;
    }

    #[tokio::test]
    async fn test_dispatcher_preserves_producer_order() {
        let reg = active_registry("radio1").await;
        let sink = RecordingSink::new();
        reg.register_listener("radio1", None, sink.clone())
            .await
            .unwrap();

        let config = RelayConfig::default().rate_limit(Duration::from_millis(1));
        let (tx, dispatcher) = BroadcastDispatcher::channel(Arc::clone(&reg), &config);
        let handle = tokio::spawn(dispatcher.run());

        for chunk in [&b"c1"[..], b"c2", b"c3"] {
            tx.send(StreamChunk::new("radio1", Bytes::copy_from_slice(chunk)))
                .await
                .unwrap();
        }
        drop(tx); // dispatcher drains and exits
        handle.await.unwrap();

        // Give in-flight fan-out tasks a beat to finish.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            sink.chunks().await,
            vec![b"c1".to_vec(), b"c2".to_vec(), b"c3".to_vec()]
        );
    }
}
