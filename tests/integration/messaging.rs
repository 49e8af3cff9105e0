//! Request/response over an upgraded connection.

use std::thread;

use serde_json::json;
use tungstenite::Message;

use crate::helpers::{call, recv_json, send, TestServer};

#[test]
fn test_echo() {
    let server = TestServer::start();
    let mut ws = server.connect();

    let reply = call(&mut ws, "echo", json!({ "text": "hello" }));
    assert_eq!(reply, json!({ "e": null, "p": { "text": "hello" } }));
}

#[test]
fn test_binary_command() {
    let server = TestServer::start();
    let mut ws = server.connect();

    let command = json!({ "m": "echo", "p": [1, 2, 3] }).to_string();
    ws.send(Message::Binary(command.into_bytes())).unwrap();
    assert_eq!(recv_json(&mut ws), json!({ "e": null, "p": [1, 2, 3] }));
}

#[test]
fn test_method_not_found() {
    let server = TestServer::start();
    let mut ws = server.connect();

    let reply = call(&mut ws, "nope", json!({}));
    assert_eq!(reply, json!({ "e": "method not found", "p": null }));

    // The connection stays usable.
    let reply = call(&mut ws, "echo", json!(1));
    assert_eq!(reply["p"], 1);
}

#[test]
fn test_invalid_command() {
    let server = TestServer::start();
    let mut ws = server.connect();

    ws.send(Message::Text("not json".into())).unwrap();
    assert_eq!(recv_json(&mut ws), json!({ "e": "invalid command", "p": null }));
}

#[test]
fn test_ping_is_answered() {
    let server = TestServer::start();
    let mut ws = server.connect();

    ws.send(Message::Ping(b"are you there".to_vec())).unwrap();
    loop {
        match ws.read().unwrap() {
            Message::Pong(payload) => {
                assert_eq!(payload, b"are you there");
                break;
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

#[test]
fn test_replies_in_order() {
    let server = TestServer::start();
    let mut ws = server.connect();

    for i in 0..50 {
        send(&mut ws, "echo", json!(i));
    }
    for i in 0..50 {
        assert_eq!(recv_json(&mut ws)["p"], i);
    }
}

#[test]
fn test_released_request_is_overtaken() {
    let server = TestServer::start();
    let mut ws = server.connect();

    send(&mut ws, "slow", json!({ "ms": 300 }));
    send(&mut ws, "echo", json!("fast"));

    assert_eq!(recv_json(&mut ws)["p"], "fast");
    assert_eq!(recv_json(&mut ws)["p"], json!({ "slow": 300 }));
}

#[test]
fn test_held_request_blocks_next_read() {
    let server = TestServer::start();
    let mut ws = server.connect();

    send(&mut ws, "sleep", json!({ "ms": 200 }));
    send(&mut ws, "echo", json!("second"));

    assert_eq!(recv_json(&mut ws)["p"], json!({ "slept": 200 }));
    assert_eq!(recv_json(&mut ws)["p"], "second");
}

#[test]
fn test_large_message() {
    let server = TestServer::start();
    let mut ws = server.connect();

    let text = "x".repeat(200_000);
    let reply = call(&mut ws, "echo", json!(text));
    assert_eq!(reply["p"].as_str().map(str::len), Some(200_000));
}

#[test]
fn test_many_clients() {
    let server = TestServer::start();

    let clients: Vec<_> = (0..8)
        .map(|n| {
            let mut ws = server.connect();
            thread::spawn(move || {
                for i in 0..20 {
                    let reply = call(&mut ws, "echo", json!({ "client": n, "i": i }));
                    assert_eq!(reply["p"], json!({ "client": n, "i": i }));
                }
            })
        })
        .collect();

    for client in clients {
        client.join().unwrap();
    }
    assert_eq!(server.recorder.opened(), 8);
}
