//! Relay TCP front end

pub mod listener;

pub use listener::RelayServer;
