//! Protocol error types.

use std::fmt;
use std::io;

use http::StatusCode;
use tungstenite::protocol::frame::coding::CloseCode;

/// Errors raised by the handshake and the frame codec.
#[derive(Debug)]
pub enum ProtocolError {
    /// I/O error on the underlying stream.
    Io(io::Error),

    /// The HTTP upgrade request was rejected.
    Handshake {
        /// Status sent back to the client.
        status: StatusCode,
        /// Why the request was rejected.
        reason: &'static str,
    },

    /// A reserved header bit was set.
    ReservedBits,

    /// Unknown opcode.
    InvalidOpCode(u8),

    /// Client frame without a masking key.
    UnmaskedFrame,

    /// Control frame with FIN cleared.
    FragmentedControl,

    /// Control frame payload over 125 bytes.
    ControlTooLong(u64),

    /// 64-bit length with the most significant bit set.
    InvalidLength,

    /// Continuation frame with no message in progress.
    UnexpectedContinuation,

    /// New data frame while a fragmented message is in progress.
    ExpectedContinuation,

    /// Message exceeds the configured limit.
    MessageTooLarge {
        /// Size the message would have reached.
        size: u64,
        /// Configured maximum.
        max: usize,
    },

    /// Text payload is not valid UTF-8.
    InvalidUtf8,

    /// Close frame body of one byte.
    InvalidClosePayload,

    /// A message did not decode as the expected JSON value.
    Json(serde_json::Error),

    /// The peer sent a close frame; the close has been echoed.
    Closed {
        /// Status code sent by the peer, if any.
        code: Option<CloseCode>,
        /// Reason sent by the peer.
        reason: String,
    },
}

impl ProtocolError {
    /// Close status to send before dropping the connection, if any.
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            ProtocolError::Io(_) | ProtocolError::Handshake { .. } | ProtocolError::Closed { .. } => {
                None
            }
            ProtocolError::MessageTooLarge { .. } => Some(CloseCode::Size),
            ProtocolError::InvalidUtf8 | ProtocolError::Json(_) => Some(CloseCode::Invalid),
            _ => Some(CloseCode::Protocol),
        }
    }

    /// Check if the peer closed the connection cleanly.
    pub fn is_closed(&self) -> bool {
        matches!(self, ProtocolError::Closed { .. })
    }

    /// Check if the error is an I/O timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
            ProtocolError::Handshake { status, reason } => {
                write!(f, "handshake rejected ({}): {}", status.as_u16(), reason)
            }
            ProtocolError::ReservedBits => write!(f, "reserved bits set"),
            ProtocolError::InvalidOpCode(op) => write!(f, "invalid opcode: {:#x}", op),
            ProtocolError::UnmaskedFrame => write!(f, "client frame is not masked"),
            ProtocolError::FragmentedControl => write!(f, "fragmented control frame"),
            ProtocolError::ControlTooLong(len) => {
                write!(f, "control frame payload too long: {} bytes", len)
            }
            ProtocolError::InvalidLength => write!(f, "invalid payload length"),
            ProtocolError::UnexpectedContinuation => write!(f, "unexpected continuation frame"),
            ProtocolError::ExpectedContinuation => write!(f, "expected continuation frame"),
            ProtocolError::MessageTooLarge { size, max } => {
                write!(f, "message too large: {} bytes (max {})", size, max)
            }
            ProtocolError::InvalidUtf8 => write!(f, "invalid UTF-8 in text payload"),
            ProtocolError::InvalidClosePayload => write!(f, "invalid close frame payload"),
            ProtocolError::Json(e) => write!(f, "invalid JSON payload: {}", e),
            ProtocolError::Closed { code, reason } => match code {
                Some(code) => write!(f, "connection closed by peer: {} {}", u16::from(*code), reason),
                None => write!(f, "connection closed by peer"),
            },
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Io(e) => Some(e),
            ProtocolError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Json(e)
    }
}

/// Errors out of tungstenite's frame header parser and frame encoder.
impl From<tungstenite::Error> for ProtocolError {
    fn from(e: tungstenite::Error) -> Self {
        use tungstenite::error::ProtocolError as WireError;

        match e {
            tungstenite::Error::Io(e) => ProtocolError::Io(e),
            tungstenite::Error::Protocol(WireError::InvalidOpcode(op)) => {
                ProtocolError::InvalidOpCode(op)
            }
            other => ProtocolError::Io(io::Error::new(io::ErrorKind::InvalidData, other)),
        }
    }
}
