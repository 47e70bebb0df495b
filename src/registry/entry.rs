//! Registry record types

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::sink::ChunkSink;

/// A known listener account
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Password, stored and compared verbatim (integrity only; the wire
    /// protocol offers no cryptographic protection)
    pub password: String,
    /// Streampoints this user may attach to; empty means all
    pub allowed_streampoints: Vec<String>,
}

/// The single active producer of a streampoint
///
/// Exists only while the producing connection is alive. `last_activity`
/// drives the two-tier liveness policy.
pub struct ProducerSlot {
    pub last_activity: Instant,
    /// Output handle, used only to acknowledge and to close on teardown
    pub sink: Arc<dyn ChunkSink>,
}

impl ProducerSlot {
    pub fn new(sink: Arc<dyn ChunkSink>) -> Self {
        Self {
            last_activity: Instant::now(),
            sink,
        }
    }
}

/// One active listener of a streampoint
pub struct ListenerEntry {
    /// Login the connection authenticated as; `None` for anonymous
    /// listeners. Used to cascade user removal.
    pub login: Option<String>,
    /// Output handle the broadcast dispatcher writes through
    pub sink: Arc<dyn ChunkSink>,
}

/// Outcome of credential validation for a listener handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerAuth {
    /// Credentials accepted for the requested streampoint
    Authorized,
    /// Login unknown
    UnknownUser,
    /// Login known, password mismatch
    BadPassword,
    /// Non-empty allow-list does not include the streampoint
    NotAllowed,
}

/// Per-streampoint status for the admin listing
#[derive(Debug, Clone, Serialize)]
pub struct StreampointInfo {
    pub stream_point: String,
    pub client_count: usize,
    pub server_connected: bool,
}

/// Per-user status for the admin listing
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub login: String,
    pub password: String,
    pub allowed_streampoints: Vec<String>,
}
