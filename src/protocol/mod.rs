//! WebSocket wire protocol (RFC 6455, server side).
//!
//! The connection core only relies on this module through a narrow
//! surface: [`upgrade`] a raw stream, [`read_message`] the next frame with
//! control frames answered inline, and [`write_frame`] / [`write_close`]
//! for buffered outbound frames.
//!
//! Opcodes, close codes and outbound encoding are tungstenite's. Reads take
//! exactly the bytes they need and never buffer ahead, so readiness
//! reported by the poller always reflects unread frames.

mod error;
mod frame;
mod handshake;

pub use error::ProtocolError;
pub use frame::{
    handle_control, parse_close_body, read_message, write_close, write_frame, Frame,
};
pub use handshake::{upgrade, Handshake};
pub use tungstenite::protocol::frame::coding::{CloseCode, Control, Data, OpCode};
