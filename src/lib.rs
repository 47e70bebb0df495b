//! streamcaster: a live-audio relay
//!
//! One TCP port, two roles. Producers push a raw byte stream at a named
//! channel ("streampoint") with an Icecast-style `SOURCE` handshake;
//! listeners attach with an HTTP-style `GET` and receive the same bytes in
//! arrival order. A single broadcast dispatcher fans each inbound chunk
//! out to every listener of the streampoint without serializing on the
//! slowest client; stalled producers are detected with a two-tier timeout
//! and torn down together with their listeners.
//!
//! # Architecture
//!
//! ```text
//!  producers ──► SourceSession ──► broadcast queue ──► BroadcastDispatcher
//!                     │                                      │ fan-out
//!                     ▼                                      ▼
//!                 Registry ◄── ListenerSession ◄──── listener sockets
//!                     ▲
//!                     │ four mutations + two listings
//!                AdminServer ──► JsonConfigStore
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use streamcaster::broadcast::BroadcastDispatcher;
//! use streamcaster::registry::{NoPersist, Registry};
//! use streamcaster::{RelayConfig, RelayServer};
//!
//! #[tokio::main]
//! async fn main() -> streamcaster::Result<()> {
//!     let registry = Arc::new(Registry::new(Arc::new(NoPersist)));
//!     registry.add_streampoint("radio1").await?;
//!
//!     let config = RelayConfig::default();
//!     let (queue, dispatcher) = BroadcastDispatcher::channel(Arc::clone(&registry), &config);
//!     tokio::spawn(dispatcher.run());
//!
//!     RelayServer::new(config, registry, queue).run().await
//! }
//! ```

pub mod admin;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod sink;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use registry::Registry;
pub use server::RelayServer;
