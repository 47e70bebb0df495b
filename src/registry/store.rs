//! Registry implementation
//!
//! Owns the authoritative in-memory state: known streampoints, known users,
//! the single producer slot per streampoint, and the listener entries per
//! streampoint. All four maps live under one mutex; every structural
//! mutation runs inside it so that registration/cleanup races serialize.
//! The lock is never held across a socket operation: snapshots are copied
//! out under the lock, handle closes happen after it is released.
//!
//! Removal operations treat an absent key as already cleaned up. Sessions
//! route every exit path through them, so double cleanup is the norm, not
//! an error.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::entry::{ListenerAuth, ListenerEntry, ProducerSlot, StreampointInfo, UserInfo, UserRecord};
use super::error::RegistryError;
use crate::sink::ChunkSink;

/// Collaborator that makes registry state durable
///
/// Invoked synchronously after each successful mutating admin operation,
/// before the operation returns. The collaborator owns file format and
/// location; the registry only hands over the current sets.
pub trait ConfigPersist: Send + Sync {
    fn persist(&self, streampoints: &[String], users: &[UserInfo]) -> std::io::Result<()>;
}

/// Persistence stub for embedded and test use
pub struct NoPersist;

impl ConfigPersist for NoPersist {
    fn persist(&self, _streampoints: &[String], _users: &[UserInfo]) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct State {
    streampoints: HashSet<String>,
    users: HashMap<String, UserRecord>,
    sources: HashMap<String, ProducerSlot>,
    listeners: HashMap<String, HashMap<u64, ListenerEntry>>,
}

impl State {
    fn auth_check(&self, login: &str, password: &str, streampoint: &str) -> ListenerAuth {
        let user = match self.users.get(login) {
            Some(user) => user,
            None => return ListenerAuth::UnknownUser,
        };
        if user.password != password {
            return ListenerAuth::BadPassword;
        }
        if !user.allowed_streampoints.is_empty()
            && !user.allowed_streampoints.iter().any(|sp| sp == streampoint)
        {
            return ListenerAuth::NotAllowed;
        }
        ListenerAuth::Authorized
    }
}

/// Central registry for streampoints, users, producers, and listeners
pub struct Registry {
    state: Mutex<State>,
    persist: Arc<dyn ConfigPersist>,
    next_listener_id: AtomicU64,
}

impl Registry {
    /// Create an empty registry
    pub fn new(persist: Arc<dyn ConfigPersist>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            persist,
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Create a registry seeded from persisted configuration
    pub fn with_seed(
        streampoints: Vec<String>,
        users: HashMap<String, UserRecord>,
        persist: Arc<dyn ConfigPersist>,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                streampoints: streampoints.into_iter().collect(),
                users,
                sources: HashMap::new(),
                listeners: HashMap::new(),
            }),
            persist,
            next_listener_id: AtomicU64::new(1),
        }
    }

    fn persist_locked(&self, state: &State) -> Result<(), RegistryError> {
        let mut streampoints: Vec<String> = state.streampoints.iter().cloned().collect();
        streampoints.sort();
        let mut users: Vec<UserInfo> = state
            .users
            .iter()
            .map(|(login, record)| UserInfo {
                login: login.clone(),
                password: record.password.clone(),
                allowed_streampoints: record.allowed_streampoints.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.login.cmp(&b.login));

        self.persist.persist(&streampoints, &users).map_err(|e| {
            tracing::error!(error = %e, "Config persistence failed");
            RegistryError::Persist(e.to_string())
        })
    }

    // --- admin-facing mutations -------------------------------------------

    /// Register a new streampoint
    pub async fn add_streampoint(&self, streampoint: &str) -> Result<(), RegistryError> {
        if streampoint.is_empty() || streampoint.starts_with('/') {
            return Err(RegistryError::InvalidStreampoint(streampoint.to_string()));
        }

        let mut state = self.state.lock().await;
        if state.streampoints.contains(streampoint) {
            return Err(RegistryError::StreampointExists(streampoint.to_string()));
        }
        state.streampoints.insert(streampoint.to_string());
        self.persist_locked(&state)?;

        tracing::info!(streampoint = streampoint, "Streampoint added");
        Ok(())
    }

    /// Remove a streampoint, cascading to its producer slot and every one
    /// of its listener entries
    pub async fn remove_streampoint(&self, streampoint: &str) -> Result<(), RegistryError> {
        let mut closing: Vec<Arc<dyn ChunkSink>> = Vec::new();
        let persisted = {
            let mut state = self.state.lock().await;
            if !state.streampoints.remove(streampoint) {
                return Err(RegistryError::StreampointNotFound(streampoint.to_string()));
            }
            if let Some(slot) = state.sources.remove(streampoint) {
                closing.push(slot.sink);
            }
            if let Some(entries) = state.listeners.remove(streampoint) {
                closing.extend(entries.into_values().map(|e| e.sink));
            }
            self.persist_locked(&state)
        };

        // Detached handles get closed even when persistence failed.
        for sink in closing {
            sink.shutdown().await;
        }
        persisted?;
        tracing::info!(streampoint = streampoint, "Streampoint removed");
        Ok(())
    }

    /// Register a new user
    pub async fn add_user(
        &self,
        login: &str,
        password: &str,
        allowed_streampoints: Vec<String>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        if state.users.contains_key(login) {
            return Err(RegistryError::UserExists(login.to_string()));
        }
        state.users.insert(
            login.to_string(),
            UserRecord {
                password: password.to_string(),
                allowed_streampoints,
            },
        );
        self.persist_locked(&state)?;

        tracing::info!(login = login, "User added");
        Ok(())
    }

    /// Remove a user, cascading to every listener entry attributed to that
    /// login across all streampoints
    pub async fn remove_user(&self, login: &str) -> Result<(), RegistryError> {
        let mut closing: Vec<Arc<dyn ChunkSink>> = Vec::new();
        let mut dropped = 0usize;
        let persisted = {
            let mut state = self.state.lock().await;
            if state.users.remove(login).is_none() {
                return Err(RegistryError::UserNotFound(login.to_string()));
            }
            for entries in state.listeners.values_mut() {
                entries.retain(|_, entry| {
                    if entry.login.as_deref() == Some(login) {
                        closing.push(Arc::clone(&entry.sink));
                        dropped += 1;
                        false
                    } else {
                        true
                    }
                });
            }
            self.persist_locked(&state)
        };

        for sink in closing {
            sink.shutdown().await;
        }
        persisted?;
        tracing::info!(login = login, dropped_listeners = dropped, "User removed");
        Ok(())
    }

    // --- listener admission -----------------------------------------------

    /// Validate listener credentials against a streampoint, without mutation
    pub async fn validate_listener(
        &self,
        login: &str,
        password: &str,
        streampoint: &str,
    ) -> ListenerAuth {
        let state = self.state.lock().await;
        state.auth_check(login, password, streampoint)
    }

    /// Full admission check for a listener handshake: credentials (when
    /// present), streampoint existence, producer liveness. Read-only; one
    /// critical section.
    pub async fn admit_listener(
        &self,
        credentials: Option<(&str, &str)>,
        streampoint: &str,
    ) -> Result<(), RegistryError> {
        let state = self.state.lock().await;

        if let Some((login, password)) = credentials {
            match state.auth_check(login, password, streampoint) {
                ListenerAuth::Authorized => {}
                ListenerAuth::UnknownUser => {
                    return Err(RegistryError::UserNotFound(login.to_string()));
                }
                ListenerAuth::BadPassword => {
                    return Err(RegistryError::AuthFailed(login.to_string()));
                }
                ListenerAuth::NotAllowed => {
                    return Err(RegistryError::NotAllowed {
                        login: login.to_string(),
                        streampoint: streampoint.to_string(),
                    });
                }
            }
        }

        if !state.streampoints.contains(streampoint) {
            return Err(RegistryError::StreampointNotFound(streampoint.to_string()));
        }
        if !state.sources.contains_key(streampoint) {
            return Err(RegistryError::SourceInactive(streampoint.to_string()));
        }
        Ok(())
    }

    /// Register a listener connection and return its generated id
    ///
    /// The producer may have vanished between admission and registration
    /// (the acknowledgment write sits in between); in that case the entry
    /// is not created.
    pub async fn register_listener(
        &self,
        streampoint: &str,
        login: Option<String>,
        sink: Arc<dyn ChunkSink>,
    ) -> Result<u64, RegistryError> {
        let mut state = self.state.lock().await;
        if !state.streampoints.contains(streampoint) {
            return Err(RegistryError::StreampointNotFound(streampoint.to_string()));
        }
        if !state.sources.contains_key(streampoint) {
            return Err(RegistryError::SourceInactive(streampoint.to_string()));
        }

        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        state
            .listeners
            .entry(streampoint.to_string())
            .or_default()
            .insert(id, ListenerEntry { login, sink });

        tracing::info!(
            streampoint = streampoint,
            listener_id = id,
            "Listener added"
        );
        Ok(id)
    }

    /// Remove one listener entry, closing its handle; absent ids are no-ops
    pub async fn remove_listener(&self, streampoint: &str, id: u64) {
        let removed = {
            let mut state = self.state.lock().await;
            state
                .listeners
                .get_mut(streampoint)
                .and_then(|entries| entries.remove(&id))
        };

        if let Some(entry) = removed {
            entry.sink.shutdown().await;
            tracing::debug!(
                streampoint = streampoint,
                listener_id = id,
                "Listener removed"
            );
        }
    }

    // --- producer lifecycle -----------------------------------------------

    /// Claim the producer slot for a streampoint
    ///
    /// Rejected if the streampoint is unknown or the slot is occupied; a
    /// second producer is never queued.
    pub async fn register_source(
        &self,
        streampoint: &str,
        sink: Arc<dyn ChunkSink>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock().await;
        if !state.streampoints.contains(streampoint) {
            return Err(RegistryError::StreampointNotFound(streampoint.to_string()));
        }
        if state.sources.contains_key(streampoint) {
            return Err(RegistryError::SourceBusy(streampoint.to_string()));
        }
        state
            .sources
            .insert(streampoint.to_string(), ProducerSlot::new(sink));

        tracing::info!(streampoint = streampoint, "Source registered");
        Ok(())
    }

    /// Record producer activity (a successful read)
    pub async fn touch_source(&self, streampoint: &str) {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.sources.get_mut(streampoint) {
            slot.last_activity = Instant::now();
        }
    }

    /// Time since the producer's last activity; `None` if the slot is gone
    /// (removed by admin cascade or a racing cleanup)
    pub async fn source_idle(&self, streampoint: &str) -> Option<Duration> {
        let state = self.state.lock().await;
        state
            .sources
            .get(streampoint)
            .map(|slot| slot.last_activity.elapsed())
    }

    /// Tear down a producer: remove its slot and every listener entry of
    /// the streampoint, then close all handles. Idempotent.
    ///
    /// Producer loss invalidates downstream listeners immediately; they
    /// are not kept waiting for a reconnect.
    pub async fn drop_source(&self, streampoint: &str) {
        let mut closing: Vec<Arc<dyn ChunkSink>> = Vec::new();
        let mut dropped = 0usize;
        {
            let mut state = self.state.lock().await;
            if let Some(slot) = state.sources.remove(streampoint) {
                closing.push(slot.sink);
            }
            if let Some(entries) = state.listeners.remove(streampoint) {
                dropped = entries.len();
                closing.extend(entries.into_values().map(|e| e.sink));
            }
        }

        if closing.is_empty() {
            return; // already cleaned up
        }
        for sink in closing {
            sink.shutdown().await;
        }
        tracing::info!(
            streampoint = streampoint,
            dropped_listeners = dropped,
            "Source dropped"
        );
    }

    // --- reads ------------------------------------------------------------

    /// Whether the streampoint is registered
    pub async fn has_streampoint(&self, streampoint: &str) -> bool {
        self.state.lock().await.streampoints.contains(streampoint)
    }

    /// Whether the streampoint has a live producer
    pub async fn has_active_source(&self, streampoint: &str) -> bool {
        self.state.lock().await.sources.contains_key(streampoint)
    }

    /// Copy of the current listener handles for a streampoint
    ///
    /// Fan-out writes happen against this snapshot with the lock released;
    /// a listener removed mid-broadcast is simply absent from the next
    /// snapshot.
    pub async fn listener_snapshot(&self, streampoint: &str) -> Vec<(u64, Arc<dyn ChunkSink>)> {
        let state = self.state.lock().await;
        state
            .listeners
            .get(streampoint)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(id, entry)| (*id, Arc::clone(&entry.sink)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of listeners currently attached to a streampoint
    pub async fn listener_count(&self, streampoint: &str) -> usize {
        let state = self.state.lock().await;
        state
            .listeners
            .get(streampoint)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Streampoint listing for the admin API, sorted by identifier
    pub async fn streampoint_info(&self) -> Vec<StreampointInfo> {
        let state = self.state.lock().await;
        let mut info: Vec<StreampointInfo> = state
            .streampoints
            .iter()
            .map(|sp| StreampointInfo {
                stream_point: sp.clone(),
                client_count: state.listeners.get(sp).map(|e| e.len()).unwrap_or(0),
                server_connected: state.sources.contains_key(sp),
            })
            .collect();
        info.sort_by(|a, b| a.stream_point.cmp(&b.stream_point));
        info
    }

    /// User listing for the admin API, sorted by login
    pub async fn user_info(&self) -> Vec<UserInfo> {
        let state = self.state.lock().await;
        let mut info: Vec<UserInfo> = state
            .users
            .iter()
            .map(|(login, record)| UserInfo {
                login: login.clone(),
                password: record.password.clone(),
                allowed_streampoints: record.allowed_streampoints.clone(),
            })
            .collect();
        info.sort_by(|a, b| a.login.cmp(&b.login));
        info
    }
}
