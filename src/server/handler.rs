//! Application callbacks.

use std::sync::Arc;

use crate::error::Error;
use crate::protocol::Frame;
use crate::socket::{Resume, Socket};

/// Callbacks invoked by the server over a connection's life.
///
/// `on_open` and `on_disconnect` run at most once per socket. `on_read`
/// runs on a pool worker with the socket's gate held; it may release the
/// gate early through `resume` to let the next frame be read while it is
/// still working. Every error the server cannot handle itself goes to
/// `on_error`.
pub trait EventHandler: Send + Sync + 'static {
    fn on_open(&self, socket: &Arc<Socket>) {
        tracing::debug!(socket = %socket.id(), peer = ?socket.peer_addr(), "connection opened");
    }

    fn on_disconnect(&self, socket: &Arc<Socket>) {
        tracing::debug!(socket = %socket.id(), "connection closed");
    }

    fn on_read(&self, socket: &Arc<Socket>, frame: Frame, resume: &Resume);

    /// `socket` is `None` for listener and handshake failures. A peer's
    /// close frame also arrives here, right before `on_disconnect`.
    fn on_error(&self, err: &Error, socket: Option<&Arc<Socket>>) {
        match socket {
            Some(socket) if err.is_peer_close() => {
                tracing::debug!(socket = %socket.id(), reason = %err, "closed by peer")
            }
            Some(socket) => tracing::warn!(socket = %socket.id(), error = %err, "connection error"),
            None => tracing::warn!(error = %err, "server error"),
        }
    }
}
