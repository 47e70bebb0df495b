//! Relay configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Bytes read from a socket per read call, both for the initial handshake
/// buffer and for producer chunks.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Relay configuration options
///
/// Defaults carry the production constants: producers are considered
/// stalled after 120 s of silence (logged, tolerated) and torn down after
/// 300 s; the drain loops pause 100 ms per iteration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the relay port binds to
    pub bind_addr: SocketAddr,

    /// Shared secret producers present in the SOURCE handshake; also the
    /// admin API credential
    pub source_password: String,

    /// Producer silence after which the streampoint is logged as stalled.
    /// The session keeps running.
    pub soft_timeout: Duration,

    /// Producer silence after which the session is torn down and all of
    /// the streampoint's listeners are dropped
    pub reconnect_deadline: Duration,

    /// Pause inserted after each producer-read and each broadcast-dispatch
    /// iteration; throttles upstream drain and dispatch-loop overhead
    pub rate_limit: Duration,

    /// Bounded wait for a single producer read
    pub read_timeout: Duration,

    /// Bounded wait for popping the broadcast queue
    pub queue_pop_timeout: Duration,

    /// Capacity of the broadcast queue; a full queue backpressures the
    /// source session
    pub queue_capacity: usize,

    /// Maximum concurrent relay connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:2101".parse().unwrap(),
            source_password: "server_password".to_string(),
            soft_timeout: Duration::from_secs(120),
            reconnect_deadline: Duration::from_secs(300),
            rate_limit: Duration::from_millis(100),
            read_timeout: Duration::from_secs(1),
            queue_pop_timeout: Duration::from_secs(10),
            queue_capacity: 1024,
            max_connections: 0,
            tcp_nodelay: true,
        }
    }
}

impl RelayConfig {
    /// Create a config with a custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the shared source password
    pub fn source_password(mut self, password: impl Into<String>) -> Self {
        self.source_password = password.into();
        self
    }

    /// Set the soft (log-only) producer timeout
    pub fn soft_timeout(mut self, timeout: Duration) -> Self {
        self.soft_timeout = timeout;
        self
    }

    /// Set the hard producer deadline
    pub fn reconnect_deadline(mut self, deadline: Duration) -> Self {
        self.reconnect_deadline = deadline;
        self
    }

    /// Set the per-iteration rate-limit pause
    pub fn rate_limit(mut self, interval: Duration) -> Self {
        self.rate_limit = interval;
        self
    }

    /// Set the bounded producer-read wait
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set maximum concurrent connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.bind_addr.port(), 2101);
        assert_eq!(config.soft_timeout, Duration::from_secs(120));
        assert_eq!(config.reconnect_deadline, Duration::from_secs(300));
        assert_eq!(config.rate_limit, Duration::from_millis(100));
        assert_eq!(config.max_connections, 0);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = RelayConfig::default()
            .bind(addr)
            .source_password("hunter2")
            .soft_timeout(Duration::from_secs(5))
            .reconnect_deadline(Duration::from_secs(10))
            .rate_limit(Duration::from_millis(10))
            .max_connections(64);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.source_password, "hunter2");
        assert_eq!(config.soft_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect_deadline, Duration::from_secs(10));
        assert_eq!(config.rate_limit, Duration::from_millis(10));
        assert_eq!(config.max_connections, 64);
    }

    #[test]
    fn test_soft_timeout_below_deadline() {
        // The two-tier policy only makes sense with soft < hard.
        let config = RelayConfig::default();
        assert!(config.soft_timeout < config.reconnect_deadline);
    }
}
