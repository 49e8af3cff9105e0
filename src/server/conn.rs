//! Per-connection setup and read dispatch.

use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use super::Context;
use crate::error::{Error, Result};
use crate::poller::{Desc, Event};
use crate::protocol::{self, CloseCode};
use crate::socket::{self, Socket};

/// A registered connection. Kept alive by its poller callback.
struct Connection {
    socket: Arc<Socket>,
    desc: Desc,
    ctx: Arc<Context>,
}

/// Upgrade an accepted stream and register it for read readiness.
///
/// On handshake failure the stream is closed and no socket is created.
pub(crate) fn open(ctx: &Arc<Context>, stream: TcpStream, peer: Option<SocketAddr>) -> Result<()> {
    socket::configure(&stream, ctx.config.io_timeout)?;

    let handshake = match protocol::upgrade(&stream) {
        Ok(handshake) => handshake,
        Err(source) => {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(Error::Upgrade { peer, source });
        }
    };

    let socket = Socket::new(
        stream,
        handshake,
        ctx.config.io_timeout,
        ctx.config.max_message_size,
    )?;
    let conn = Arc::new(Connection {
        desc: Desc::read(socket.stream()),
        socket,
        ctx: Arc::clone(ctx),
    });

    ctx.handler.on_open(&conn.socket);

    let registered = Arc::clone(&conn);
    if let Err(e) = ctx
        .poller
        .start(&conn.desc, move |event| registered.on_event(event))
    {
        conn.socket.force_disconnect("unexpected close");
        conn.disconnected();
        return Err(e.into());
    }

    tracing::debug!(
        socket = %conn.socket.id(),
        peer = ?peer,
        path = %conn.socket.handshake().path,
        "connection registered"
    );
    Ok(())
}

impl Connection {
    fn on_event(self: &Arc<Self>, event: Event) {
        if event.is_hangup() {
            self.hangup(event);
        } else {
            self.dispatch();
        }
    }

    /// Terminal: no read is dispatched after a hangup.
    fn hangup(&self, event: Event) {
        self.stop();
        if event.contains(Event::POLLER_CLOSED) {
            self.socket.abort(CloseCode::Away, "server shutting down");
        }
        tracing::debug!(socket = %self.socket.id(), ?event, "connection hung up");
        self.disconnected();
    }

    fn dispatch(self: &Arc<Self>) {
        let conn = Arc::clone(self);
        if let Err(e) = self.ctx.pool.schedule(move || conn.read_and_handle()) {
            if !e.is_terminated() {
                self.ctx.handler.on_error(&Error::from(e), Some(&self.socket));
            }
            self.socket.force_disconnect("unexpected close");
            self.stop();
            self.disconnected();
        }
    }

    /// Runs on a worker: read one message and hand it to the handler.
    fn read_and_handle(self: &Arc<Self>) {
        let conn = Arc::clone(self);
        let (frame, resume) = match self.socket.read_frame_then(move || conn.rearm()) {
            Ok(read) => read,
            Err(e) => return self.read_failed(e),
        };

        self.ctx.handler.on_read(&self.socket, frame, &resume);
        resume.release();
    }

    /// Every failed read, a peer close included, reaches `on_error` before
    /// `on_disconnect`.
    fn read_failed(&self, e: protocol::ProtocolError) {
        match e.close_code() {
            Some(code) => self.socket.abort(code, &e.to_string()),
            None => {
                let _ = self.socket.close();
            }
        }
        self.stop();

        tracing::debug!(socket = %self.socket.id(), reason = %e, "connection read failed");
        self.ctx.handler.on_error(&Error::from(e), Some(&self.socket));
        self.disconnected();
    }

    fn rearm(&self) {
        if self.socket.is_closed() {
            return;
        }
        if let Err(e) = self.ctx.poller.resume(&self.desc) {
            tracing::debug!(socket = %self.socket.id(), error = %e, "re-arm failed");
        }
    }

    fn stop(&self) {
        if let Err(e) = self.ctx.poller.stop(&self.desc) {
            tracing::debug!(socket = %self.socket.id(), error = %e, "deregister failed");
        }
    }

    fn disconnected(&self) {
        if self.socket.mark_disconnected() {
            self.ctx.handler.on_disconnect(&self.socket);
        }
    }
}
