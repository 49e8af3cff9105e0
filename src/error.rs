//! Crate-level error type.

use std::fmt;
use std::io;
use std::net::SocketAddr;

use crate::config::ConfigError;
use crate::pool::PoolError;
use crate::protocol::ProtocolError;

/// Errors surfaced by the server and reported to event handlers.
#[derive(Debug)]
pub enum Error {
    /// I/O error on a listener, poller or stream.
    Io(io::Error),

    /// Worker pool rejected a task or its configuration.
    Pool(PoolError),

    /// Framing error on an open connection.
    Protocol(ProtocolError),

    /// A freshly accepted connection failed the opening handshake.
    Upgrade {
        peer: Option<SocketAddr>,
        source: ProtocolError,
    },

    /// Invalid configuration.
    Config(ConfigError),
}

impl Error {
    /// Check if the error is a temporary accept failure worth a cooldown.
    pub fn is_temporary(&self) -> bool {
        match self {
            Error::Io(e) => is_temporary(e),
            _ => false,
        }
    }

    /// The peer ended the connection with a close frame.
    pub fn is_peer_close(&self) -> bool {
        matches!(self, Error::Protocol(e) if e.is_closed())
    }
}

/// Accept errors that clear up on their own: resource exhaustion,
/// interrupted calls, and connections torn down before accept returned.
pub fn is_temporary(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    ) {
        return true;
    }

    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE)
            | Some(libc::ENFILE)
            | Some(libc::ENOBUFS)
            | Some(libc::ENOMEM)
            | Some(libc::ECONNABORTED)
            | Some(libc::EINTR)
            | Some(libc::ETIMEDOUT)
            | Some(libc::ECONNRESET)
    )
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Pool(e) => write!(f, "{}", e),
            Error::Protocol(e) => write!(f, "protocol error: {}", e),
            Error::Upgrade { peer, source } => match peer {
                Some(peer) => write!(f, "upgrade failed for {}: {}", peer, source),
                None => write!(f, "upgrade failed: {}", source),
            },
            Error::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Pool(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Upgrade { source, .. } => Some(source),
            Error::Config(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<PoolError> for Error {
    fn from(e: PoolError) -> Self {
        Error::Pool(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

/// Result type alias for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_errors() {
        for code in [libc::EMFILE, libc::ENFILE, libc::ENOBUFS, libc::ENOMEM] {
            assert!(is_temporary(&io::Error::from_raw_os_error(code)));
        }
        assert!(is_temporary(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(!is_temporary(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_temporary(&io::Error::from_raw_os_error(libc::EBADF)));
    }

    #[test]
    fn test_from_conversions() {
        let err: Error = PoolError::Terminated.into();
        assert!(matches!(err, Error::Pool(PoolError::Terminated)));
        assert!(!err.is_temporary());

        let err: Error = io::Error::from_raw_os_error(libc::EMFILE).into();
        assert!(err.is_temporary());
    }

    #[test]
    fn test_peer_close() {
        let err: Error = ProtocolError::Closed {
            code: None,
            reason: String::new(),
        }
        .into();
        assert!(err.is_peer_close());
        assert!(!Error::from(ProtocolError::UnmaskedFrame).is_peer_close());
    }

    #[test]
    fn test_upgrade_display() {
        let err = Error::Upgrade {
            peer: Some("127.0.0.1:9000".parse().unwrap()),
            source: ProtocolError::UnmaskedFrame,
        };
        assert_eq!(
            err.to_string(),
            "upgrade failed for 127.0.0.1:9000: client frame is not masked"
        );
    }
}
