//! JSON method router.
//!
//! Text and binary messages are decoded as [`Command`]s and dispatched by
//! method name. Handlers reply through the [`Request`], which writes a
//! [`Response`] envelope back on the same connection.

mod command;
mod error;
mod request;

pub use command::{Command, Response};
pub use error::RouterError;
pub use request::Request;

use std::collections::HashMap;
use std::sync::Arc;

use crate::protocol::Frame;
use crate::server::EventHandler;
use crate::socket::{Resume, Socket};

/// Method handler.
pub type Handler = Arc<dyn Fn(&Request<'_>) -> Result<(), RouterError> + Send + Sync>;

/// Maps method names to handlers.
#[derive(Default, Clone)]
pub struct Router {
    handlers: HashMap<String, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `method`, replacing any previous one.
    pub fn register<F>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(&Request<'_>) -> Result<(), RouterError> + Send + Sync + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(handler));
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }

    /// Run the handler registered for the request's method.
    pub fn handle(&self, req: &Request<'_>) -> Result<(), RouterError> {
        match self.handlers.get(req.method()) {
            Some(handler) => handler(req),
            None => Err(RouterError::MethodNotFound(req.method().to_string())),
        }
    }
}

impl EventHandler for Router {
    fn on_read(&self, socket: &Arc<Socket>, frame: Frame, resume: &Resume) {
        if frame.is_control() {
            return;
        }

        let command = match Command::parse(frame.payload()) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(socket = %socket.id(), error = %e, "undecodable message");
                if let Err(e) = resume.write_json(&Response::error(e.client_message())) {
                    tracing::debug!(socket = %socket.id(), error = %e, "failed to write response");
                }
                return;
            }
        };

        let req = Request::new(socket, resume, command);
        let result = self.handle(&req);
        match result {
            Ok(()) => {
                tracing::trace!(socket = %socket.id(), method = req.method(), "handled");
            }
            Err(RouterError::Write(e)) => {
                tracing::debug!(socket = %socket.id(), method = req.method(), error = %e, "failed to write response");
            }
            Err(e) => {
                tracing::debug!(socket = %socket.id(), method = req.method(), error = %e, "command failed");
                if let Err(e) = req.write_error(e.client_message()) {
                    tracing::debug!(socket = %socket.id(), error = %e, "failed to write response");
                }
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.methods())
            .finish()
    }
}
