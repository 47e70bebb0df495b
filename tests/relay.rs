//! End-to-end relay tests over loopback sockets

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use streamcaster::broadcast::BroadcastDispatcher;
use streamcaster::registry::{NoPersist, Registry};
use streamcaster::{RelayConfig, RelayServer};

const PASSWORD: &str = "server_password";

fn fast_config() -> RelayConfig {
    RelayConfig::with_addr("127.0.0.1:0".parse().unwrap())
        .source_password(PASSWORD)
        .rate_limit(Duration::from_millis(5))
        .read_timeout(Duration::from_millis(50))
}

async fn start_relay(config: RelayConfig) -> (SocketAddr, Arc<Registry>) {
    let registry = Arc::new(Registry::new(Arc::new(NoPersist)));
    let (queue, dispatcher) = BroadcastDispatcher::channel(Arc::clone(&registry), &config);
    tokio::spawn(dispatcher.run());

    let server = Arc::new(RelayServer::new(config, Arc::clone(&registry), queue));
    let listener = server.listen().await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve(&listener).await;
    });

    (addr, registry)
}

async fn connect_source(addr: SocketAddr, password: &str, streampoint: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("SOURCE {} /{}\n", password, streampoint).as_bytes())
        .await
        .unwrap();
    stream
}

async fn connect_listener(
    addr: SocketAddr,
    streampoint: &str,
    credentials: Option<(&str, &str)>,
) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut request = format!("GET /{} HTTP/1.1\r\n", streampoint);
    if let Some((login, password)) = credentials {
        let token = BASE64_STANDARD.encode(format!("{}:{}", login, password));
        request.push_str(&format!("Authorization: Basic {}\r\n", token));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    stream
}

async fn read_reply(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("reply timed out")
        .unwrap();
    buf
}

async fn read_line_reply(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 256];
    let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("reply timed out")
        .unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}

/// Poll a condition for up to two seconds.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_source_to_listener_delivery() {
    let (addr, registry) = start_relay(fast_config()).await;
    registry.add_streampoint("radio1").await.unwrap();
    registry
        .add_user("alice", "secret", vec!["radio1".to_string()])
        .await
        .unwrap();

    let mut source = connect_source(addr, PASSWORD, "radio1").await;
    assert_eq!(read_reply(&mut source, 14).await, b"ICY 200 OK\r\n\r\n");

    let mut listener = connect_listener(addr, "radio1", Some(("alice", "secret"))).await;
    assert_eq!(read_reply(&mut listener, 12).await, b"ICY 200 OK\r\n");

    source.write_all(b"abc").await.unwrap();
    assert_eq!(read_reply(&mut listener, 3).await, b"abc");
}

#[tokio::test]
async fn test_chunks_arrive_in_producer_order() {
    let (addr, registry) = start_relay(fast_config()).await;
    registry.add_streampoint("radio1").await.unwrap();

    let mut source = connect_source(addr, PASSWORD, "radio1").await;
    read_reply(&mut source, 14).await;

    let mut listener = connect_listener(addr, "radio1", None).await;
    read_reply(&mut listener, 12).await;

    source.write_all(b"c1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    source.write_all(b"c2").await.unwrap();

    assert_eq!(read_reply(&mut listener, 4).await, b"c1c2");
}

#[tokio::test]
async fn test_second_source_rejected() {
    let (addr, registry) = start_relay(fast_config()).await;
    registry.add_streampoint("radio1").await.unwrap();

    let mut first = connect_source(addr, PASSWORD, "radio1").await;
    assert_eq!(read_reply(&mut first, 14).await, b"ICY 200 OK\r\n\r\n");

    let mut second = connect_source(addr, PASSWORD, "radio1").await;
    assert_eq!(
        read_line_reply(&mut second).await,
        "ERROR - streampoint is already in use\r\n"
    );

    // The first producer stays active.
    assert!(registry.has_active_source("radio1").await);
}

#[tokio::test]
async fn test_source_bad_password() {
    let (addr, registry) = start_relay(fast_config()).await;
    registry.add_streampoint("radio1").await.unwrap();

    let mut source = connect_source(addr, "wrong", "radio1").await;
    assert_eq!(
        read_line_reply(&mut source).await,
        "ERROR - Invalid streampoint or password\r\n"
    );
    assert!(!registry.has_active_source("radio1").await);
}

#[tokio::test]
async fn test_source_unknown_streampoint() {
    let (addr, _registry) = start_relay(fast_config()).await;

    let mut source = connect_source(addr, PASSWORD, "ghost").await;
    assert_eq!(
        read_line_reply(&mut source).await,
        "ERROR - Invalid streampoint or password\r\n"
    );
}

#[tokio::test]
async fn test_invalid_protocol_line() {
    let (addr, _registry) = start_relay(fast_config()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"HELLO there\r\n").await.unwrap();
    assert_eq!(
        read_line_reply(&mut stream).await,
        "ERROR - Invalid protocol\r\n"
    );
}

#[tokio::test]
async fn test_listener_not_allowed() {
    let (addr, registry) = start_relay(fast_config()).await;
    registry.add_streampoint("radio1").await.unwrap();
    registry
        .add_user("alice", "secret", vec!["other".to_string()])
        .await
        .unwrap();

    let mut listener = connect_listener(addr, "radio1", Some(("alice", "secret"))).await;
    assert_eq!(
        read_line_reply(&mut listener).await,
        "Error - streampoint not allowed for user\r\n"
    );
    assert_eq!(registry.listener_count("radio1").await, 0);
}

#[tokio::test]
async fn test_listener_rejection_variants() {
    let (addr, registry) = start_relay(fast_config()).await;
    registry.add_streampoint("radio1").await.unwrap();
    registry.add_user("alice", "secret", vec![]).await.unwrap();

    // Unknown user.
    let mut l = connect_listener(addr, "radio1", Some(("mallory", "x"))).await;
    assert_eq!(read_line_reply(&mut l).await, "Error - User not found\r\n");

    // Wrong password.
    let mut l = connect_listener(addr, "radio1", Some(("alice", "wrong"))).await;
    assert_eq!(
        read_line_reply(&mut l).await,
        "Error - User authorization failed\r\n"
    );

    // Known point without a producer.
    let mut l = connect_listener(addr, "radio1", Some(("alice", "secret"))).await;
    assert_eq!(
        read_line_reply(&mut l).await,
        "Error - streampoint is not active\r\n"
    );

    // Unknown point (producer liveness never reached).
    let mut l = connect_listener(addr, "ghost", Some(("alice", "secret"))).await;
    assert_eq!(
        read_line_reply(&mut l).await,
        "Error - streampoint not found\r\n"
    );
}

#[tokio::test]
async fn test_disconnected_listener_dropped_others_keep_stream() {
    let (addr, registry) = start_relay(fast_config()).await;
    registry.add_streampoint("radio1").await.unwrap();

    let mut source = connect_source(addr, PASSWORD, "radio1").await;
    read_reply(&mut source, 14).await;

    let mut staying = connect_listener(addr, "radio1", None).await;
    read_reply(&mut staying, 12).await;
    let mut leaving = connect_listener(addr, "radio1", None).await;
    read_reply(&mut leaving, 12).await;
    assert_eq!(registry.listener_count("radio1").await, 2);

    drop(leaving);

    // Keep sending; the dead socket's write eventually fails and the entry
    // is removed while the surviving listener keeps receiving.
    let mut received = Vec::new();
    for _ in 0..50 {
        source.write_all(b"x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        if registry.listener_count("radio1").await == 1 {
            break;
        }
    }
    assert_eq!(registry.listener_count("radio1").await, 1);

    source.write_all(b"tail").await.unwrap();
    let mut buf = vec![0u8; 256];
    loop {
        let n = timeout(Duration::from_secs(5), staying.read(&mut buf))
            .await
            .expect("survivor stopped receiving")
            .unwrap();
        assert!(n > 0);
        received.extend_from_slice(&buf[..n]);
        if received.ends_with(b"tail") {
            break;
        }
    }
}

#[tokio::test]
async fn test_remove_user_drops_active_listener() {
    let (addr, registry) = start_relay(fast_config()).await;
    registry.add_streampoint("radio1").await.unwrap();
    registry.add_user("bob", "pw", vec![]).await.unwrap();

    let mut source = connect_source(addr, PASSWORD, "radio1").await;
    read_reply(&mut source, 14).await;

    let mut listener = connect_listener(addr, "radio1", Some(("bob", "pw"))).await;
    read_reply(&mut listener, 12).await;
    assert_eq!(registry.listener_count("radio1").await, 1);

    registry.remove_user("bob").await.unwrap();
    assert_eq!(registry.listener_count("radio1").await, 0);
}

#[tokio::test]
async fn test_remove_streampoint_rejects_future_listeners() {
    let (addr, registry) = start_relay(fast_config()).await;
    registry.add_streampoint("radio1").await.unwrap();

    let mut source = connect_source(addr, PASSWORD, "radio1").await;
    read_reply(&mut source, 14).await;
    let mut listener = connect_listener(addr, "radio1", None).await;
    read_reply(&mut listener, 12).await;

    registry.remove_streampoint("radio1").await.unwrap();
    assert!(!registry.has_active_source("radio1").await);
    assert_eq!(registry.listener_count("radio1").await, 0);

    let mut late = connect_listener(addr, "radio1", None).await;
    assert_eq!(
        read_line_reply(&mut late).await,
        "Error - streampoint not found\r\n"
    );
}

#[tokio::test]
async fn test_silent_source_torn_down_after_hard_deadline() {
    let config = fast_config()
        .soft_timeout(Duration::from_millis(100))
        .reconnect_deadline(Duration::from_millis(250))
        .read_timeout(Duration::from_millis(20));
    let (addr, registry) = start_relay(config).await;
    registry.add_streampoint("radio1").await.unwrap();

    let mut source = connect_source(addr, PASSWORD, "radio1").await;
    read_reply(&mut source, 14).await;

    let mut listener = connect_listener(addr, "radio1", None).await;
    read_reply(&mut listener, 12).await;

    // No transport error occurs; the producer simply stays silent.
    let registry2 = Arc::clone(&registry);
    eventually(move || {
        let registry = Arc::clone(&registry2);
        async move {
            !registry.has_active_source("radio1").await
                && registry.listener_count("radio1").await == 0
        }
    })
    .await;

    // The streampoint survives and a new producer can claim it.
    let mut retry = connect_source(addr, PASSWORD, "radio1").await;
    assert_eq!(read_reply(&mut retry, 14).await, b"ICY 200 OK\r\n\r\n");
}

#[tokio::test]
async fn test_active_source_kept_past_soft_timeout() {
    let config = fast_config()
        .soft_timeout(Duration::from_millis(100))
        .reconnect_deadline(Duration::from_secs(30))
        .read_timeout(Duration::from_millis(20));
    let (addr, registry) = start_relay(config).await;
    registry.add_streampoint("radio1").await.unwrap();

    let mut source = connect_source(addr, PASSWORD, "radio1").await;
    read_reply(&mut source, 14).await;

    // Well past the soft timeout but short of the hard deadline the
    // session must still be alive.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(registry.has_active_source("radio1").await);

    // And it still relays data afterwards.
    let mut listener = connect_listener(addr, "radio1", None).await;
    read_reply(&mut listener, 12).await;
    source.write_all(b"back").await.unwrap();
    assert_eq!(read_reply(&mut listener, 4).await, b"back");
}
