//! Connection open, close and server shutdown.

use std::time::Duration;

use serde_json::json;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::CloseFrame;
use tungstenite::Message;

use crate::helpers::{call, send, wait_until, TestServer};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_open_and_client_close() {
    let server = TestServer::start();
    let mut ws = server.connect();
    assert_eq!(call(&mut ws, "echo", json!(1))["p"], 1);
    assert!(wait_until(WAIT, || server.recorder.opened() == 1));

    ws.close(None).unwrap();
    // Drain until the server's close reply arrives.
    while ws.read().is_ok() {}

    assert!(wait_until(WAIT, || server.recorder.disconnected() == 1));
    assert!(wait_until(WAIT, || server.server.connections() == 0));
    // The peer's close ends the read loop through `on_error`.
    assert_eq!(server.recorder.errors().len(), 1);
}

#[test]
fn test_client_close_reports_error_then_disconnect() {
    let server = TestServer::start();
    let mut ws = server.connect();
    assert_eq!(call(&mut ws, "echo", json!("hi"))["p"], "hi");

    ws.close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "done".into(),
    }))
    .unwrap();
    while ws.read().is_ok() {}

    assert!(wait_until(WAIT, || server.recorder.disconnected() == 1));
    assert_eq!(server.recorder.events(), ["open", "error", "disconnect"]);
    let errors = server.recorder.errors();
    assert!(errors[0].contains("1000"), "{:?}", errors);
}

#[test]
fn test_abrupt_drop_disconnects() {
    let server = TestServer::start();
    let ws = server.connect();
    assert!(wait_until(WAIT, || server.server.connections() == 1));

    drop(ws);

    assert!(wait_until(WAIT, || server.recorder.disconnected() == 1));
    assert!(wait_until(WAIT, || server.server.connections() == 0));
}

#[test]
fn test_server_initiated_disconnect() {
    let server = TestServer::start();
    let mut ws = server.connect();

    send(&mut ws, "bye", json!(null));
    match ws.read().unwrap() {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Normal);
            assert_eq!(frame.reason, "bye");
        }
        other => panic!("expected close, got {:?}", other),
    }

    assert!(wait_until(WAIT, || server.recorder.disconnected() == 1));
}

#[test]
fn test_disconnect_reported_once() {
    let server = TestServer::start();
    let mut ws = server.connect();

    send(&mut ws, "bye", json!(null));
    while ws.read().is_ok() {}
    drop(ws);

    assert!(wait_until(WAIT, || server.recorder.disconnected() == 1));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(server.recorder.disconnected(), 1);
}

#[test]
fn test_shutdown_sends_going_away() {
    let server = TestServer::start();
    let mut clients: Vec<_> = (0..3).map(|_| server.connect()).collect();
    assert!(wait_until(WAIT, || server.server.connections() == 3));

    server.server.shutdown();
    assert!(server.server.pool().is_terminated());

    for ws in &mut clients {
        match ws.read().unwrap() {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Away),
            other => panic!("expected close, got {:?}", other),
        }
    }
    assert!(wait_until(WAIT, || server.recorder.disconnected() == 3));
    assert_eq!(server.server.connections(), 0);
}

#[test]
fn test_shutdown_is_idempotent() {
    let server = TestServer::start();
    server.server.shutdown();
    server.server.shutdown();
    assert!(server.server.pool().is_terminated());
}

#[test]
fn test_hangup_during_handler() {
    let server = TestServer::start();
    let mut ws = server.connect();

    send(&mut ws, "sleep", json!({ "ms": 200 }));
    std::thread::sleep(Duration::from_millis(50));
    drop(ws);

    // The in-flight handler finishes, then the hangup is seen exactly once.
    assert!(wait_until(WAIT, || server.recorder.disconnected() == 1));
    assert!(wait_until(WAIT, || server.server.connections() == 0));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(server.recorder.disconnected(), 1);
}
