//! Handler context.

use std::sync::Arc;

use serde_json::Value;

use super::{Command, Response, RouterError};
use crate::socket::{Resume, Socket};

/// A decoded command together with the connection it arrived on.
///
/// Replies go through the read window's [`Resume`], so they never wait on
/// the gate the current read still holds.
pub struct Request<'a> {
    socket: &'a Arc<Socket>,
    resume: &'a Resume,
    command: Command,
}

impl<'a> Request<'a> {
    pub fn new(socket: &'a Arc<Socket>, resume: &'a Resume, command: Command) -> Self {
        Self {
            socket,
            resume,
            command,
        }
    }

    pub fn socket(&self) -> &Arc<Socket> {
        self.socket
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn method(&self) -> &str {
        &self.command.method
    }

    pub fn params(&self) -> &Value {
        &self.command.params
    }

    /// Let the next frame on this connection be read while this request is
    /// still being handled.
    pub fn release(&self) {
        self.resume.release();
    }

    pub fn write_success(&self, params: Value) -> Result<(), RouterError> {
        Ok(self.resume.write_json(&Response::success(params))?)
    }

    pub fn write_error(&self, message: impl Into<String>) -> Result<(), RouterError> {
        Ok(self.resume.write_json(&Response::error(message))?)
    }
}

impl std::fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("socket", &self.socket.id())
            .field("command", &self.command)
            .finish()
    }
}
