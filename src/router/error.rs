//! Router error types.

use std::fmt;

use crate::protocol::ProtocolError;

/// Errors raised while decoding or dispatching a command.
#[derive(Debug)]
pub enum RouterError {
    /// No handler registered under this method name.
    MethodNotFound(String),

    /// Payload is not a valid command.
    InvalidCommand(serde_json::Error),

    /// Writing the reply failed.
    Write(ProtocolError),

    /// Handler-defined failure, reported to the client as is.
    Handler(String),
}

impl RouterError {
    /// Message sent to the client in the `e` field of the response.
    pub fn client_message(&self) -> String {
        match self {
            RouterError::MethodNotFound(_) => "method not found".to_string(),
            RouterError::InvalidCommand(_) => "invalid command".to_string(),
            RouterError::Write(_) => "internal error".to_string(),
            RouterError::Handler(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterError::MethodNotFound(method) => write!(f, "method not found: {}", method),
            RouterError::InvalidCommand(e) => write!(f, "invalid command: {}", e),
            RouterError::Write(e) => write!(f, "failed to write response: {}", e),
            RouterError::Handler(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RouterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RouterError::InvalidCommand(e) => Some(e),
            RouterError::Write(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProtocolError> for RouterError {
    fn from(e: ProtocolError) -> Self {
        RouterError::Write(e)
    }
}

impl From<serde_json::Error> for RouterError {
    fn from(e: serde_json::Error) -> Self {
        RouterError::InvalidCommand(e)
    }
}
