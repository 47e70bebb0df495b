//! Crate-level error type
//!
//! Session-local failures (bad handshakes, dead sockets, producer timeouts)
//! are handled inside the owning session and never surface here. This type
//! covers the operations that can fail towards a caller: binding the
//! listeners, loading the config file, and registry mutations driven by the
//! admin layer.

use crate::registry::RegistryError;

/// Result alias for fallible streamcaster operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error (bind, accept, config file)
    Io(std::io::Error),
    /// Config file missing, unreadable, or malformed
    Config(String),
    /// Registry operation rejected
    Registry(RegistryError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}
