//! Deferred release of a socket's read window.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::Socket;
use crate::protocol::{Data, OpCode, ProtocolError};

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Capability that ends the read window opened by [`Socket::read_frame`].
///
/// The socket's gate stays held until the first call to [`Resume::release`]
/// or until the last clone is dropped, whichever comes first. Later calls
/// do nothing.
///
/// Writes made through a `Resume` go through the held gate while the
/// window is open, and take the gate normally once it is released, so a
/// handler can reply without deadlocking against its own read.
#[derive(Clone)]
pub struct Resume {
    inner: Arc<Inner>,
}

struct Inner {
    socket: Arc<Socket>,
    released: Mutex<bool>,
    after_release: Mutex<Option<Hook>>,
}

impl Resume {
    pub(crate) fn new(socket: Arc<Socket>, after_release: Option<Hook>) -> Self {
        Self {
            inner: Arc::new(Inner {
                socket,
                released: Mutex::new(false),
                after_release: Mutex::new(after_release),
            }),
        }
    }

    /// Release the gate. Safe to call any number of times.
    pub fn release(&self) {
        self.inner.release();
    }

    pub fn is_released(&self) -> bool {
        *self.inner.released.lock()
    }

    pub fn socket(&self) -> &Arc<Socket> {
        &self.inner.socket
    }

    /// Write one frame to the socket.
    pub fn write_frame(&self, op: OpCode, payload: &[u8]) -> Result<(), ProtocolError> {
        let released = self.inner.released.lock();
        if *released {
            drop(released);
            return self.inner.socket.write_frame(op, payload);
        }
        // The gate is ours until `released` flips, which waits on this lock.
        self.inner.socket.write_held(op, payload)
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
}

impl std::fmt::Debug for Resume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resume")
            .field("socket", &self.inner.socket.id())
            .field("released", &self.is_released())
            .finish()
    }
}

impl Inner {
    fn release(&self) {
        {
            let mut released = self.released.lock();
            if *released {
                return;
            }
            *released = true;
            self.socket.gate.release();
        }

        let hook = self.after_release.lock().take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.release();
    }
}
