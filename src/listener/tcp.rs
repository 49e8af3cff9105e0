//! TCP listener creation via socket2.

use std::io;
use std::net::TcpListener;

use socket2::{Domain, Protocol, Socket, Type};

use super::ListenerConfig;

/// Bind a non-blocking TCP listener.
pub fn bind(config: &ListenerConfig) -> io::Result<TcpListener> {
    let domain = if config.addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;

    #[cfg(unix)]
    if config.reuse_port {
        socket.set_reuse_port(true)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&config.addr.into())?;
    socket.listen(config.backlog)?;

    let listener: TcpListener = socket.into();
    tracing::debug!(addr = ?listener.local_addr().ok(), backlog = config.backlog, "listener bound");
    Ok(listener)
}
