//! Opening handshake over a raw socket.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::helpers::{wait_until, TestServer};

fn raw_request(server: &TestServer, request: &str) -> String {
    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(request.as_bytes()).unwrap();

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    response
}

#[test]
fn test_plain_http_rejected() {
    let server = TestServer::start();
    let response = raw_request(&server, "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");

    assert!(response.starts_with("HTTP/1.1 400"), "got: {}", response);
    assert!(wait_until(Duration::from_secs(5), || !server
        .recorder
        .errors()
        .is_empty()));
    assert_eq!(server.recorder.opened(), 0);
}

#[test]
fn test_wrong_version_rejected() {
    let server = TestServer::start();
    let response = raw_request(
        &server,
        "GET /chat HTTP/1.1\r\n\
         Host: localhost\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 8\r\n\r\n",
    );

    assert!(response.starts_with("HTTP/1.1 426"), "got: {}", response);
    // Header names go out lowercase.
    assert!(response
        .to_ascii_lowercase()
        .contains("sec-websocket-version: 13"));
}

#[test]
fn test_accept_key() {
    let server = TestServer::start();
    let mut stream = TcpStream::connect(server.addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
        .write_all(
            b"GET /chat HTTP/1.1\r\n\
              Host: localhost\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
              Sec-WebSocket-Version: 13\r\n\r\n",
        )
        .unwrap();

    let mut buf = [0u8; 512];
    let n = stream.read(&mut buf).unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);

    assert!(response.starts_with("HTTP/1.1 101"), "got: {}", response);
    assert!(response.contains("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    assert!(wait_until(Duration::from_secs(5), || server.recorder.opened() == 1));
}
