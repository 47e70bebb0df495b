//! Administrative HTTP API
//!
//! A small HTTP/1.1 endpoint on its own port, separate from the relay
//! protocol. It drives the four registry mutations and the two listings:
//!
//! ```text
//! POST   /streampoints/        create streampoint          (auth)
//! GET    /streampoints/        list with client counts
//! DELETE /streampoints/{id}    remove streampoint          (auth)
//! POST   /users/               create user                 (auth)
//! GET    /users/               list users with allow-lists
//! DELETE /users/{login}        remove user                 (auth)
//! ```
//!
//! Mutating routes require Basic auth whose password matches the shared
//! server secret; this boundary is the one place credentials are compared
//! in constant time. Every response body is JSON and connections are
//! closed after one exchange.

use std::net::SocketAddr;
use std::sync::Arc;

use base64::prelude::*;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;
use crate::registry::{Registry, RegistryError};

/// Maximum size of a request head plus body we are willing to buffer
const MAX_REQUEST_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct StreampointCreate {
    stream_point: String,
}

#[derive(Debug, Deserialize)]
struct UserCreate {
    login: String,
    password: String,
    #[serde(default)]
    allowed_streampoints: Vec<String>,
}

/// The admin endpoint
pub struct AdminServer {
    addr: SocketAddr,
    registry: Arc<Registry>,
    password: String,
}

impl AdminServer {
    pub fn new(addr: SocketAddr, registry: Arc<Registry>, password: impl Into<String>) -> Self {
        Self {
            addr,
            registry,
            password: password.into(),
        }
    }

    /// Bind the admin address
    pub async fn listen(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "Admin API listening");
        Ok(listener)
    }

    /// Run the admin endpoint; blocks until shut down
    pub async fn run(&self) -> Result<()> {
        let listener = self.listen().await?;
        self.serve(&listener).await
    }

    /// Accept loop over an already-bound listener
    pub async fn serve(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let registry = Arc::clone(&self.registry);
                    let password = self.password.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle(socket, registry, password).await {
                            tracing::debug!(peer = %peer_addr, error = %e, "Admin request failed");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept admin connection");
                }
            }
        }
    }
}

struct Request {
    method: String,
    path: String,
    authorized: bool,
    body: Vec<u8>,
}

async fn handle(
    mut socket: TcpStream,
    registry: Arc<Registry>,
    password: String,
) -> std::io::Result<()> {
    let request = match read_request(&mut socket, &password).await? {
        Some(request) => request,
        None => return Ok(()),
    };

    let (status, body) = route(&request, &registry).await;
    respond(&mut socket, status, &body).await
}

async fn route(request: &Request, registry: &Registry) -> (u16, serde_json::Value) {
    let path = request.path.trim_end_matches('/');
    match (request.method.as_str(), path) {
        ("POST", "/streampoints") => {
            if !request.authorized {
                return unauthorized();
            }
            let create: StreampointCreate = match serde_json::from_slice(&request.body) {
                Ok(create) => create,
                Err(e) => return (400, json!({ "detail": e.to_string() })),
            };
            match registry.add_streampoint(&create.stream_point).await {
                Ok(()) => (
                    201,
                    json!({
                        "message":
                            format!("streampoint {} created successfully", create.stream_point)
                    }),
                ),
                Err(e) => rejection(e),
            }
        }
        ("GET", "/streampoints") => {
            let info = registry.streampoint_info().await;
            (200, serde_json::to_value(info).unwrap_or_default())
        }
        ("DELETE", _) if path.starts_with("/streampoints/") => {
            if !request.authorized {
                return unauthorized();
            }
            let id = &path["/streampoints/".len()..];
            match registry.remove_streampoint(id).await {
                Ok(()) => (200, json!({ "delete": "success", "streampoint": id })),
                Err(RegistryError::StreampointNotFound(_)) => {
                    (404, json!({ "detail": "streampoint not found" }))
                }
                Err(e) => rejection(e),
            }
        }
        ("POST", "/users") => {
            if !request.authorized {
                return unauthorized();
            }
            let create: UserCreate = match serde_json::from_slice(&request.body) {
                Ok(create) => create,
                Err(e) => return (400, json!({ "detail": e.to_string() })),
            };
            match registry
                .add_user(&create.login, &create.password, create.allowed_streampoints)
                .await
            {
                Ok(()) => (
                    201,
                    json!({ "message": format!("User {} created successfully", create.login) }),
                ),
                Err(e) => rejection(e),
            }
        }
        ("GET", "/users") => {
            let info = registry.user_info().await;
            (200, serde_json::to_value(info).unwrap_or_default())
        }
        ("DELETE", _) if path.starts_with("/users/") => {
            if !request.authorized {
                return unauthorized();
            }
            let login = &path["/users/".len()..];
            match registry.remove_user(login).await {
                Ok(()) => (200, json!({ "delete": "success", "user": login })),
                Err(RegistryError::UserNotFound(_)) => (404, json!({ "detail": "User not found" })),
                Err(e) => rejection(e),
            }
        }
        _ => (404, json!({ "detail": "Not Found" })),
    }
}

fn unauthorized() -> (u16, serde_json::Value) {
    (401, json!({ "detail": "Invalid server credentials" }))
}

fn rejection(e: RegistryError) -> (u16, serde_json::Value) {
    let status = match e {
        RegistryError::Persist(_) => 500,
        RegistryError::StreampointNotFound(_) | RegistryError::UserNotFound(_) => 404,
        _ => 400,
    };
    (status, json!({ "detail": e.to_string() }))
}

/// Read one HTTP request: head up to the blank line, then a
/// Content-Length body. Returns `None` for an empty or overlong request.
async fn read_request(socket: &mut TcpStream, password: &str) -> std::io::Result<Option<Request>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Ok(None);
        }
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method.to_string(), path.to_string()),
        _ => return Ok(None),
    };

    let mut authorized = false;
    let mut content_length = 0usize;
    for line in lines {
        let (name, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => continue,
        };
        match name.to_ascii_lowercase().as_str() {
            "authorization" => authorized = check_basic_auth(value.trim(), password),
            "content-length" => content_length = value.trim().parse().unwrap_or(0),
            _ => {}
        }
    }
    if content_length > MAX_REQUEST_BYTES {
        return Ok(None);
    }

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(Request {
        method,
        path,
        authorized,
        body,
    }))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn check_basic_auth(value: &str, password: &str) -> bool {
    let encoded = match value.strip_prefix("Basic ") {
        Some(encoded) => encoded.trim(),
        None => return false,
    };
    let decoded = match BASE64_STANDARD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let decoded = String::from_utf8_lossy(&decoded);
    match decoded.split_once(':') {
        Some((_login, supplied)) => constant_time_eq(supplied.as_bytes(), password.as_bytes()),
        None => false,
    }
}

/// Timing-safe comparison for the admin credential boundary
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

async fn respond(socket: &mut TcpStream, status: u16, body: &serde_json::Value) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    let payload = body.to_string();
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        payload.len()
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(payload.as_bytes()).await?;
    socket.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secrets"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_check_basic_auth() {
        let header = format!("Basic {}", BASE64_STANDARD.encode("admin:server_password"));
        assert!(check_basic_auth(&header, "server_password"));
        assert!(!check_basic_auth(&header, "other"));
        assert!(!check_basic_auth("Bearer token", "server_password"));
        assert!(!check_basic_auth("Basic !!!", "server_password"));
    }

    #[test]
    fn test_find_head_end() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(14));
        assert_eq!(find_head_end(b"partial"), None);
    }
}
