//! Accept cooldown and pool saturation.

use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::Message;

use wspoll::{ListenConfig, PoolConfig};

use crate::helpers::{call, recv_json, send, TestServer};

#[test]
fn test_saturated_pool_delays_accept() {
    // One worker, no backlog: while it sleeps, accepts cannot be scheduled.
    let server = TestServer::with(
        PoolConfig::new(1, 0, 1),
        ListenConfig::default().with_cooldown(Duration::from_millis(20)),
    );

    let mut busy = server.connect();
    send(&mut busy, "sleep", json!({ "ms": 300 }));
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let mut late = server.connect();
    assert!(started.elapsed() >= Duration::from_millis(150));

    assert_eq!(call(&mut late, "echo", json!("late"))["p"], "late");
    let reply = recv_json(&mut busy);
    assert_eq!(reply["p"], json!({ "slept": 300 }));
}

#[test]
fn test_cooldown_ends_on_termination() {
    let server = TestServer::with(
        PoolConfig::new(1, 0, 1),
        ListenConfig::default().with_cooldown(Duration::from_secs(30)),
    );

    let mut busy = server.connect();
    send(&mut busy, "sleep", json!({ "ms": 200 }));
    thread::sleep(Duration::from_millis(50));

    // Triggers a failed accept and a long cooldown.
    let _pending = std::net::TcpStream::connect(server.addr).unwrap();
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    server.server.shutdown();
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_oversized_message_closes_with_too_big() {
    let server = TestServer::with(
        PoolConfig::new(4, 1, 1),
        ListenConfig::default().with_max_message_size(64),
    );
    let mut ws = server.connect();

    ws.send(Message::Text("y".repeat(100))).unwrap();
    match ws.read().unwrap() {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Size),
        other => panic!("expected close, got {:?}", other),
    }
}
