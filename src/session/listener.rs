//! Listener session
//!
//! A single pass, no loop: authenticate (only if an Authorization header
//! was sent; anonymous listeners are permitted), check the allow-list,
//! check that the streampoint exists and has a live producer, acknowledge,
//! register. Each rejection gets its own diagnostic line and ends the
//! session before anything is registered.
//!
//! After registration the session's responsibility ends. The socket stays
//! open and is driven solely by broadcast fan-out; a failed fan-out write
//! is what eventually tears the connection down.

use std::sync::Arc;

use crate::protocol::{self, AuthHeader};
use crate::registry::{Registry, RegistryError};
use crate::sink::ChunkSink;

/// One listener handshake
pub struct ListenerSession {
    session_id: u64,
    registry: Arc<Registry>,
}

impl ListenerSession {
    pub fn new(session_id: u64, registry: Arc<Registry>) -> Self {
        Self {
            session_id,
            registry,
        }
    }

    /// Handle the handshake; `initial` is the full first read (request
    /// line plus whatever header fields arrived with it).
    pub async fn run(self, initial: &[u8], streampoint: String, sink: Arc<dyn ChunkSink>) {
        let credentials = match protocol::parse_authorization(initial) {
            AuthHeader::Anonymous => None,
            AuthHeader::Credentials { login, password } => Some((login, password)),
            AuthHeader::Malformed => {
                tracing::debug!(
                    session_id = self.session_id,
                    streampoint = %streampoint,
                    "Listener dropped: malformed authorization header"
                );
                sink.shutdown().await;
                return;
            }
        };
        let login = credentials.as_ref().map(|(l, _)| l.clone());

        let creds_ref = credentials
            .as_ref()
            .map(|(l, p)| (l.as_str(), p.as_str()));
        if let Err(e) = self.registry.admit_listener(creds_ref, &streampoint).await {
            let reply: &[u8] = match &e {
                RegistryError::UserNotFound(_) => protocol::ERR_USER_NOT_FOUND,
                RegistryError::AuthFailed(_) => protocol::ERR_AUTH_FAILED,
                RegistryError::NotAllowed { .. } => protocol::ERR_NOT_ALLOWED,
                RegistryError::StreampointNotFound(_) => protocol::ERR_POINT_NOT_FOUND,
                _ => protocol::ERR_POINT_INACTIVE,
            };
            tracing::debug!(
                session_id = self.session_id,
                streampoint = %streampoint,
                reason = %e,
                "Listener rejected"
            );
            let _ = sink.write_chunk(reply).await;
            sink.shutdown().await;
            return;
        }

        // Acknowledge before registering so the status line always
        // precedes the first broadcast chunk on the wire.
        if sink.write_chunk(protocol::REPLY_LISTENER_OK).await.is_err() {
            sink.shutdown().await;
            return;
        }

        match self
            .registry
            .register_listener(&streampoint, login, Arc::clone(&sink))
            .await
        {
            Ok(id) => {
                tracing::info!(
                    session_id = self.session_id,
                    streampoint = %streampoint,
                    listener_id = id,
                    "Listener attached"
                );
            }
            Err(e) => {
                // Producer vanished between admission and registration.
                tracing::debug!(
                    session_id = self.session_id,
                    streampoint = %streampoint,
                    reason = %e,
                    "Listener registration lost its source"
                );
                sink.shutdown().await;
            }
        }
    }
}
