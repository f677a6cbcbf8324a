//! End-to-end transport layer tests.
//!
//! These tests verify that the TCP transport actually serves xrootd clients
//! over real sockets, not just configuration validation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use xrootd::protocol::{
    ErrorCode, OpenFlags, OpenRequest, ProtocolRequest, Request, ResponseFrame, ServerRole,
    CLIENT_HANDSHAKE,
};
use xrootd::server::{BaseHandlerFactory, ConnectionConfig};
use xrootd::transport::TcpTransport;

/// Start a transport on an ephemeral port
async fn start_server(config: ConnectionConfig) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = TcpTransport::serve_listener(listener, config, Arc::new(BaseHandlerFactory)).await;
    });
    (addr, handle)
}

async fn handshake(addr: SocketAddr) -> TcpStream {
    let mut stream = timeout(Duration::from_secs(5), TcpStream::connect(addr))
        .await
        .expect("Connect timed out")
        .expect("Connect failed");
    stream.write_all(&CLIENT_HANDSHAKE).await.unwrap();
    let mut reply = [0u8; 16];
    timeout(Duration::from_secs(5), stream.read_exact(&mut reply))
        .await
        .expect("Handshake timed out")
        .unwrap();
    assert_eq!(&reply[..], &ServerRole::DataServer.default_reply()[..]);
    stream
}

async fn call(stream: &mut TcpStream, request: Request) -> ResponseFrame {
    stream.write_all(&request.encode()).await.unwrap();
    let mut buf = BytesMut::new();
    loop {
        if let Some(frame) = ResponseFrame::split_from(&mut buf) {
            return frame;
        }
        let n = timeout(Duration::from_secs(5), stream.read_buf(&mut buf))
            .await
            .expect("Response timed out")
            .unwrap();
        assert!(n > 0, "server closed the connection");
    }
}

#[tokio::test]
async fn test_tcp_transport_serves_protocol_request() {
    let (addr, server) = start_server(ConnectionConfig::default()).await;
    let mut stream = handshake(addr).await;

    let frame = call(
        &mut stream,
        Request::Protocol(ProtocolRequest {
            stream_id: 1,
            client_version: 0x297,
        }),
    )
    .await;
    assert_eq!(frame.stream_id, 1);
    assert_eq!(&frame.body[..], &[0, 0, 0x02, 0x97, 0, 0, 0, 1]);

    server.abort();
}

#[tokio::test]
async fn test_base_handler_rejects_file_operations() {
    let (addr, server) = start_server(ConnectionConfig::default()).await;
    let mut stream = handshake(addr).await;

    let frame = call(
        &mut stream,
        Request::Open(OpenRequest {
            stream_id: 4,
            mode: 0,
            flags: OpenFlags::from_bits(OpenFlags::READ),
            path: "/data/file".to_string(),
            opaque: Some("oss.asize=10".to_string()),
        }),
    )
    .await;
    assert_eq!(frame.stream_id, 4);
    assert_eq!(frame.error().unwrap().0, ErrorCode::Unsupported);

    server.abort();
}

#[tokio::test]
async fn test_tcp_transport_handles_concurrent_connections() {
    let (addr, server) = start_server(ConnectionConfig::default()).await;

    let mut clients = Vec::new();
    for stream_id in 1..=5u16 {
        clients.push(tokio::spawn(async move {
            let mut stream = handshake(addr).await;
            call(
                &mut stream,
                Request::Protocol(ProtocolRequest {
                    stream_id,
                    client_version: 0x297,
                }),
            )
            .await
        }));
    }

    for (i, client) in clients.into_iter().enumerate() {
        let frame = client.await.unwrap();
        assert_eq!(usize::from(frame.stream_id), i + 1);
        assert!(!frame.is_error());
    }

    server.abort();
}

#[tokio::test]
async fn test_request_before_handshake_is_dropped() {
    let (addr, server) = start_server(ConnectionConfig::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // 20 bytes that are not the handshake
    stream.write_all(&[0xff; 20]).await.unwrap();

    let mut rest = Vec::new();
    let n = timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("connection was not closed");
    // a reset is as good as an orderly close
    if let Ok(n) = n {
        assert_eq!(n, 0);
    }

    server.abort();
}
