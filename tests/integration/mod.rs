//! End-to-end tests for wspoll.
//!
//! Each test starts an in-process server on 127.0.0.1:0 and talks to it
//! with a `tungstenite` client over loopback.

mod helpers;

mod backpressure;
mod handshake;
mod lifecycle;
mod messaging;
