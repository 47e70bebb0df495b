//! First-line classification and header parsing

use base64::prelude::*;

/// Route decided by the first line of a new connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstLine {
    /// Producer handshake: `SOURCE <password> /<streampoint>`
    Source {
        password: String,
        streampoint: String,
    },
    /// Listener request: `GET /<streampoint> HTTP/x.y`
    Get { streampoint: String },
    /// Anything else; answered with a protocol error
    Invalid,
}

/// Result of scanning the initial buffer for a Basic authorization header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthHeader {
    /// No Authorization header in the initial read; listener is anonymous
    Anonymous,
    /// Header present but undecodable; the session is dropped silently
    Malformed,
    /// Decoded `login:password` pair
    Credentials { login: String, password: String },
}

/// Classify a connection from its initial read
///
/// Only the bytes before the first newline participate; for producers the
/// remainder of the buffer is discarded (the raw stream starts with the
/// next read), for listeners the caller keeps the full buffer for header
/// extraction.
pub fn classify(initial: &[u8]) -> FirstLine {
    let line = match initial.split(|&b| b == b'\n').next() {
        Some(line) => String::from_utf8_lossy(line),
        None => return FirstLine::Invalid,
    };
    let line = line.trim();

    if line.contains("SOURCE") {
        return parse_source_line(line);
    }
    if line.contains("GET /") {
        return parse_request_line(line);
    }
    FirstLine::Invalid
}

fn parse_source_line(line: &str) -> FirstLine {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("SOURCE"), Some(password), Some(mountpoint), None) => FirstLine::Source {
            password: password.to_string(),
            streampoint: mountpoint.trim_start_matches('/').to_string(),
        },
        _ => FirstLine::Invalid,
    }
}

fn parse_request_line(line: &str) -> FirstLine {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(path)) => FirstLine::Get {
            streampoint: path.trim_start_matches('/').to_string(),
        },
        _ => FirstLine::Invalid,
    }
}

/// Scan the initial buffer's header lines for `Authorization: Basic ...`
pub fn parse_authorization(initial: &[u8]) -> AuthHeader {
    for raw in initial.split(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if !(line.contains("Authorization:") && line.contains("Basic")) {
            continue;
        }

        let encoded = match line.split_whitespace().last() {
            Some(token) => token,
            None => return AuthHeader::Malformed,
        };
        let decoded = match BASE64_STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(_) => return AuthHeader::Malformed,
        };
        let decoded = match String::from_utf8(decoded) {
            Ok(s) => s,
            Err(_) => return AuthHeader::Malformed,
        };
        return match decoded.split_once(':') {
            Some((login, password)) => AuthHeader::Credentials {
                login: login.to_string(),
                password: password.to_string(),
            },
            None => AuthHeader::Malformed,
        };
    }
    AuthHeader::Anonymous
}
