//! Registry error types

/// Error type for registry operations
///
/// Every variant is a rejection surfaced to the caller; none leaves the
/// registry partially mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Streampoint already registered
    StreampointExists(String),
    /// Streampoint unknown
    StreampointNotFound(String),
    /// Login already registered
    UserExists(String),
    /// Login unknown
    UserNotFound(String),
    /// Streampoint identifier is empty or malformed
    InvalidStreampoint(String),
    /// Streampoint already has an active producer
    SourceBusy(String),
    /// Streampoint has no active producer
    SourceInactive(String),
    /// Listener password mismatch
    AuthFailed(String),
    /// Streampoint not in the user's non-empty allow-list
    NotAllowed {
        login: String,
        streampoint: String,
    },
    /// Durable persistence failed after the in-memory mutation
    Persist(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreampointExists(id) => {
                write!(f, "streampoint {} already exists", id)
            }
            RegistryError::StreampointNotFound(id) => {
                write!(f, "streampoint {} not found", id)
            }
            RegistryError::UserExists(login) => write!(f, "User {} already exists", login),
            RegistryError::UserNotFound(login) => write!(f, "User {} not found", login),
            RegistryError::InvalidStreampoint(id) => {
                write!(f, "invalid streampoint identifier {:?}", id)
            }
            RegistryError::SourceBusy(id) => {
                write!(f, "streampoint {} is already in use", id)
            }
            RegistryError::SourceInactive(id) => {
                write!(f, "streampoint {} is not active", id)
            }
            RegistryError::AuthFailed(login) => {
                write!(f, "User {} authorization failed", login)
            }
            RegistryError::NotAllowed { login, streampoint } => {
                write!(f, "streampoint {} not allowed for {}", streampoint, login)
            }
            RegistryError::Persist(msg) => write!(f, "config persistence failed: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}
