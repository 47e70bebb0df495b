//! Wire protocol: handshake classification and reply strings
//!
//! One TCP port accepts two roles. The first read of a connection (up to
//! one buffer) is split on the first newline; the header line alone decides
//! the route:
//!
//! ```text
//! SOURCE <password> /<streampoint>\n           -> producer
//! GET /<streampoint> HTTP/1.1\r\n[headers...]  -> listener
//! anything else                                -> protocol error
//! ```
//!
//! Producers get `ICY 200 OK\r\n\r\n` and then push raw bytes; listeners
//! get `ICY 200 OK\r\n` followed by the broadcast stream. All failure
//! replies are single `\r\n`-terminated lines.

pub mod handshake;

pub use handshake::{classify, parse_authorization, AuthHeader, FirstLine};

/// Producer handshake acknowledgment
pub const REPLY_SOURCE_OK: &[u8] = b"ICY 200 OK\r\n\r\n";
/// Listener handshake acknowledgment
pub const REPLY_LISTENER_OK: &[u8] = b"ICY 200 OK\r\n";

/// First line was neither a SOURCE handshake nor a GET request
pub const ERR_INVALID_PROTOCOL: &[u8] = b"ERROR - Invalid protocol\r\n";
/// SOURCE rejected: unknown streampoint or wrong password
pub const ERR_INVALID_SOURCE: &[u8] = b"ERROR - Invalid streampoint or password\r\n";
/// SOURCE rejected: another producer holds the streampoint
pub const ERR_POINT_IN_USE: &[u8] = b"ERROR - streampoint is already in use\r\n";

/// Listener rejected: login unknown
pub const ERR_USER_NOT_FOUND: &[u8] = b"Error - User not found\r\n";
/// Listener rejected: wrong password
pub const ERR_AUTH_FAILED: &[u8] = b"Error - User authorization failed\r\n";
/// Listener rejected: streampoint missing from the user's allow-list
pub const ERR_NOT_ALLOWED: &[u8] = b"Error - streampoint not allowed for user\r\n";
/// Listener rejected: streampoint does not exist
pub const ERR_POINT_NOT_FOUND: &[u8] = b"Error - streampoint not found\r\n";
/// Listener rejected: streampoint exists but has no live producer
pub const ERR_POINT_INACTIVE: &[u8] = b"Error - streampoint is not active\r\n";
