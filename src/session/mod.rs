//! Per-connection sessions
//!
//! A connection becomes either a [`source::SourceSession`] (producer: one
//! handshake, then a bounded-read drain loop with the two-tier liveness
//! policy) or a [`listener::ListenerSession`] (one-shot handshake that
//! registers the socket for fan-out and ends). Both route every exit path
//! through the registry's idempotent cleanup operations.

pub mod listener;
pub mod source;

pub use listener::ListenerSession;
pub use source::SourceSession;
