//! Upgraded WebSocket connection.
//!
//! A [`Socket`] wraps a blocking TCP stream behind an exclusivity gate:
//! at any instant either one read window or one frame write uses the
//! stream. Reads hand the gate to a [`Resume`] capability so the window
//! can outlive the call that opened it.

mod gate;
mod resume;

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::protocol::{self, CloseCode, Data, Frame, Handshake, OpCode, ProtocolError};

use gate::Gate;
pub use resume::Resume;

/// An open WebSocket connection.
pub struct Socket {
    id: Uuid,
    stream: TcpStream,
    peer_addr: Option<SocketAddr>,
    handshake: Handshake,
    gate: Gate,
    io_timeout: Duration,
    max_message_size: usize,
    closed: AtomicBool,
    disconnected: AtomicBool,
}

impl Socket {
    /// Wrap an upgraded stream, switching it to blocking I/O bounded by
    /// `io_timeout`.
    pub(crate) fn new(
        stream: TcpStream,
        handshake: Handshake,
        io_timeout: Duration,
        max_message_size: usize,
    ) -> io::Result<Arc<Self>> {
        configure(&stream, io_timeout)?;

        Ok(Arc::new(Self {
            id: Uuid::new_v4(),
            peer_addr: stream.peer_addr().ok(),
            stream,
            handshake,
            gate: Gate::new(),
            io_timeout,
            max_message_size,
            closed: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// The upgrade request that opened this connection.
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Read the next message, keeping the gate held until the returned
    /// [`Resume`] is released.
    ///
    /// Control frames are answered before returning. On error the gate is
    /// released immediately.
    pub fn read_frame(self: &Arc<Self>) -> Result<(Frame, Resume), ProtocolError> {
        self.read_frame_inner(None)
    }

    /// Like [`Socket::read_frame`], running `after_release` once the window
    /// closes.
    pub(crate) fn read_frame_then<F>(
        self: &Arc<Self>,
        after_release: F,
    ) -> Result<(Frame, Resume), ProtocolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.read_frame_inner(Some(Box::new(after_release)))
    }

    fn read_frame_inner(
        self: &Arc<Self>,
        after_release: Option<Box<dyn FnOnce() + Send + 'static>>,
    ) -> Result<(Frame, Resume), ProtocolError> {
        let guard = self.gate.acquire();
        // A failed read drops the guard here; the gate stays free for the
        // close frame teardown writes.
        let frame = protocol::read_message(&mut &self.stream, self.max_message_size)?;
        guard.leak();
        Ok((frame, Resume::new(Arc::clone(self), after_release)))
    }

    /// Read the next data message and decode it as JSON.
    ///
    /// Control frames in front of it are answered and skipped. The gate is
    /// held through the returned [`Resume`] exactly as for
    /// [`read_frame`](Self::read_frame); a payload that fails to decode
    /// releases it and returns [`ProtocolError::Json`].
    pub fn read_json<T: DeserializeOwned>(self: &Arc<Self>) -> Result<(T, Resume), ProtocolError> {
        loop {
            let (frame, resume) = self.read_frame()?;
            if frame.is_control() {
                resume.release();
                continue;
            }
            let value = serde_json::from_reader(frame.reader())?;
            return Ok((value, resume));
        }
    }

    /// Write one frame under the gate.
    pub fn write_frame(&self, op: OpCode, payload: &[u8]) -> Result<(), ProtocolError> {
        let _guard = self.gate.acquire();
        self.write_held(op, payload)
    }

    pub fn write_text(&self, text: &str) -> Result<(), ProtocolError> {
        self.write_frame(OpCode::Data(Data::Text), text.as_bytes())
    }

    pub fn write_binary(&self, payload: &[u8]) -> Result<(), ProtocolError> {
        self.write_frame(OpCode::Data(Data::Binary), payload)
    }

    /// Serialize `value` and write it as a text frame.
    pub fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), ProtocolError> {
        let payload = serde_json::to_vec(value)?;
        self.write_frame(OpCode::Data(Data::Text), &payload)
    }

    /// Write with the gate already held by the caller.
    pub(crate) fn write_held(&self, op: OpCode, payload: &[u8]) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        }
        protocol::write_frame(&mut &self.stream, op, payload)
    }

    fn close_held(&self, code: CloseCode, reason: &str) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::NotConnected).into());
        }
        protocol::write_close(&mut &self.stream, code, reason)
    }

    /// Send a normal close frame with `reason`, then close the stream.
    ///
    /// If the close frame cannot be written the error is returned and the
    /// stream is left open.
    pub fn disconnect(&self, reason: &str) -> Result<(), ProtocolError> {
        {
            let _guard = self.gate.acquire();
            self.close_held(CloseCode::Normal, reason)?;
        }
        self.close()?;
        Ok(())
    }

    /// Send a normal close frame if possible, then close unconditionally.
    pub fn force_disconnect(&self, reason: &str) {
        self.abort(CloseCode::Normal, reason);
    }

    /// Best-effort close frame with `code`, then close.
    ///
    /// Waits at most one I/O timeout for the gate; a blocked reader is
    /// woken by the shutdown instead.
    pub(crate) fn abort(&self, code: CloseCode, reason: &str) {
        if let Some(_guard) = self.gate.try_acquire_for(self.io_timeout) {
            if let Err(e) = self.close_held(code, reason) {
                tracing::trace!(socket = %self.id, error = %e, "close frame not sent");
            }
        }
        if let Err(e) = self.close() {
            tracing::debug!(socket = %self.id, error = %e, "socket close failed");
        }
    }

    /// Shut down both directions. The descriptor itself stays open until
    /// the last reference is dropped.
    pub fn close(&self) -> io::Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }

    /// Returns true exactly once, for the first caller.
    pub(crate) fn mark_disconnected(&self) -> bool {
        !self.disconnected.swap(true, Ordering::AcqRel)
    }
}

/// Switch an accepted stream to blocking I/O bounded by `io_timeout`.
///
/// A zero timeout leaves reads and writes unbounded.
pub(crate) fn configure(stream: &TcpStream, io_timeout: Duration) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let timeout = (!io_timeout.is_zero()).then_some(io_timeout);
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    Ok(())
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("path", &self.handshake.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use http::HeaderMap;

    /// Server socket plus the raw client end.
    pub(crate) fn connected() -> (Arc<Socket>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        let handshake = Handshake {
            path: "/".into(),
            headers: HeaderMap::new(),
        };
        let socket = Socket::new(server, handshake, Duration::from_millis(500), 1024).unwrap();
        (socket, client)
    }

    /// Read one unmasked server frame: (opcode, payload).
    pub(crate) fn read_server_frame(client: &mut TcpStream) -> (u8, Vec<u8>) {
        let mut head = [0u8; 2];
        client.read_exact(&mut head).unwrap();
        let len = match head[1] & 0x7f {
            126 => {
                let mut ext = [0u8; 2];
                client.read_exact(&mut ext).unwrap();
                u16::from_be_bytes(ext) as usize
            }
            127 => {
                let mut ext = [0u8; 8];
                client.read_exact(&mut ext).unwrap();
                u64::from_be_bytes(ext) as usize
            }
            n => n as usize,
        };
        let mut payload = vec![0u8; len];
        client.read_exact(&mut payload).unwrap();
        (head[0] & 0x0f, payload)
    }

    /// Encode a masked client frame.
    pub(crate) fn client_frame(op: u8, payload: &[u8]) -> Vec<u8> {
        let key = [1u8, 2, 3, 4];
        let mut out = vec![0x80 | op];
        if payload.len() < 126 {
            out.push(0x80 | payload.len() as u8);
        } else {
            out.push(0x80 | 126);
            out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        }
        out.extend_from_slice(&key);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        out
    }

    #[test]
    fn test_read_window_blocks_writers_until_release() {
        let (socket, mut client) = connected();
        client.write_all(&client_frame(0x1, b"hi")).unwrap();

        let (frame, resume) = socket.read_frame().unwrap();
        assert_eq!(frame.as_text(), Some("hi"));

        let writer = {
            let socket = Arc::clone(&socket);
            thread::spawn(move || socket.write_text("after"))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!writer.is_finished());

        resume.release();
        writer.join().unwrap().unwrap();
        assert_eq!(read_server_frame(&mut client), (0x1, b"after".to_vec()));
    }

    #[test]
    fn test_concurrent_writes_do_not_interleave() {
        let (socket, mut client) = connected();
        let writers: Vec<_> = (0..8u8)
            .map(|n| {
                let socket = Arc::clone(&socket);
                thread::spawn(move || {
                    for _ in 0..20 {
                        socket.write_binary(&[n; 300]).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..160 {
            let (op, payload) = read_server_frame(&mut client);
            assert_eq!(op, 0x2);
            assert_eq!(payload.len(), 300);
            assert!(payload.iter().all(|b| *b == payload[0]));
        }
        for writer in writers {
            writer.join().unwrap();
        }
    }

    #[test]
    fn test_ping_answered_inline() {
        let (socket, mut client) = connected();
        client.write_all(&client_frame(0x9, b"p")).unwrap();

        let (frame, resume) = socket.read_frame().unwrap();
        assert!(frame.is_control());
        drop(resume);

        assert_eq!(read_server_frame(&mut client), (0xa, b"p".to_vec()));
        assert!(!socket.gate.is_locked());
    }

    #[test]
    fn test_read_error_releases_gate() {
        let (socket, mut client) = connected();
        // Unmasked client frame.
        client.write_all(&[0x81, 0x01, b'x']).unwrap();

        let err = socket.read_frame().unwrap_err();
        assert!(matches!(err, ProtocolError::UnmaskedFrame));
        assert!(!socket.gate.is_locked());

        // Teardown gets the gate and its close frame goes out.
        socket.abort(err.close_code().unwrap(), &err.to_string());
        let (op, payload) = read_server_frame(&mut client);
        assert_eq!(op, 0x8);
        assert_eq!(&payload[..2], &1002u16.to_be_bytes());
        assert!(socket.is_closed());
    }

    #[test]
    fn test_read_json_skips_control_frames() {
        let (socket, mut client) = connected();
        client.write_all(&client_frame(0x9, b"p")).unwrap();
        client
            .write_all(&client_frame(0x1, br#"{"m":"echo","p":[1,2]}"#))
            .unwrap();

        let (value, resume) = socket.read_json::<serde_json::Value>().unwrap();
        assert_eq!(value["m"], "echo");
        assert_eq!(value["p"], serde_json::json!([1, 2]));
        assert!(socket.gate.is_locked());

        resume.write_json(&serde_json::json!({ "ok": true })).unwrap();
        resume.release();
        assert!(!socket.gate.is_locked());

        assert_eq!(read_server_frame(&mut client), (0xa, b"p".to_vec()));
        assert_eq!(
            read_server_frame(&mut client),
            (0x1, br#"{"ok":true}"#.to_vec())
        );
    }

    #[test]
    fn test_read_json_rejects_bad_payload() {
        let (socket, mut client) = connected();
        client.write_all(&client_frame(0x1, b"not json")).unwrap();

        let err = socket.read_json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
        assert_eq!(err.close_code(), Some(CloseCode::Invalid));
        assert!(!socket.gate.is_locked());
    }

    #[test]
    fn test_disconnect_sends_close() {
        let (socket, mut client) = connected();
        socket.disconnect("bye").unwrap();
        assert!(socket.is_closed());

        let (op, payload) = read_server_frame(&mut client);
        assert_eq!(op, 0x8);
        assert_eq!(&payload[..2], &1000u16.to_be_bytes());
        assert_eq!(&payload[2..], b"bye");

        assert!(socket.write_text("late").is_err());
        socket.close().unwrap();
    }

    #[test]
    fn test_force_disconnect_with_gate_held() {
        let (socket, mut client) = connected();
        socket.gate.acquire().leak();

        socket.force_disconnect("unexpected close");
        assert!(socket.is_closed());

        // No close frame could be written; the peer just sees EOF.
        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_mark_disconnected_once() {
        let (socket, _client) = connected();
        assert!(socket.mark_disconnected());
        assert!(!socket.mark_disconnected());
    }
}
