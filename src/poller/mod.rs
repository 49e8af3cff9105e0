//! Readiness notification over Linux epoll.
//!
//! A [`Poller`] owns one epoll instance and a dedicated thread that turns
//! kernel readiness into callbacks. Descriptors are registered one-shot:
//! every delivered event disarms the descriptor until [`Poller::resume`]
//! re-arms it, so callbacks for one descriptor never overlap.

mod epoll;

use std::fmt;
use std::net::{TcpListener, TcpStream};
use std::ops::{BitOr, BitOrAssign};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU64, Ordering};

pub use epoll::Poller;

/// Readiness interest and delivered conditions.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Event(u16);

impl Event {
    pub const READ: Event = Event(1 << 0);
    pub const WRITE: Event = Event(1 << 1);
    pub const ONESHOT: Event = Event(1 << 2);
    pub const EDGE_TRIGGERED: Event = Event(1 << 3);
    /// Peer shut down its writing half.
    pub const READ_HUP: Event = Event(1 << 4);
    pub const HUP: Event = Event(1 << 5);
    pub const ERR: Event = Event(1 << 6);
    /// Delivered once to each registration left when the poller closes.
    pub const POLLER_CLOSED: Event = Event(1 << 7);

    const NAMES: [(Event, &'static str); 8] = [
        (Event::READ, "READ"),
        (Event::WRITE, "WRITE"),
        (Event::ONESHOT, "ONESHOT"),
        (Event::EDGE_TRIGGERED, "EDGE_TRIGGERED"),
        (Event::READ_HUP, "READ_HUP"),
        (Event::HUP, "HUP"),
        (Event::ERR, "ERR"),
        (Event::POLLER_CLOSED, "POLLER_CLOSED"),
    ];

    pub fn empty() -> Self {
        Event(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Check if every bit of `other` is set.
    pub fn contains(self, other: Event) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if any bit of `other` is set.
    pub fn intersects(self, other: Event) -> bool {
        self.0 & other.0 != 0
    }

    /// The descriptor can no longer be read from usefully.
    pub fn is_hangup(self) -> bool {
        self.intersects(Event::READ_HUP | Event::HUP | Event::ERR | Event::POLLER_CLOSED)
    }

    pub(crate) fn to_epoll(self) -> u32 {
        let mut bits = 0u32;
        if self.contains(Event::READ) {
            bits |= libc::EPOLLIN as u32;
        }
        if self.contains(Event::WRITE) {
            bits |= libc::EPOLLOUT as u32;
        }
        if self.contains(Event::ONESHOT) {
            bits |= libc::EPOLLONESHOT as u32;
        }
        if self.contains(Event::EDGE_TRIGGERED) {
            bits |= libc::EPOLLET as u32;
        }
        if self.contains(Event::READ_HUP) {
            bits |= libc::EPOLLRDHUP as u32;
        }
        bits
    }

    pub(crate) fn from_epoll(bits: u32) -> Self {
        let mut event = Event::empty();
        if bits & (libc::EPOLLIN | libc::EPOLLPRI) as u32 != 0 {
            event |= Event::READ;
        }
        if bits & libc::EPOLLOUT as u32 != 0 {
            event |= Event::WRITE;
        }
        if bits & libc::EPOLLRDHUP as u32 != 0 {
            event |= Event::READ_HUP;
        }
        if bits & libc::EPOLLHUP as u32 != 0 {
            event |= Event::HUP;
        }
        if bits & libc::EPOLLERR as u32 != 0 {
            event |= Event::ERR;
        }
        event
    }
}

impl BitOr for Event {
    type Output = Event;

    fn bitor(self, rhs: Event) -> Event {
        Event(self.0 | rhs.0)
    }
}

impl BitOrAssign for Event {
    fn bitor_assign(&mut self, rhs: Event) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "Event(empty)");
        }
        let mut first = true;
        write!(f, "Event(")?;
        for (flag, name) in Event::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

/// Tokens identify registrations; 0 is reserved for the wake handle.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// A descriptor together with the events it is watched for.
///
/// Each `Desc` carries a unique token, so a descriptor number reused by the
/// kernel after close never matches a stale registration.
#[derive(Debug, Clone)]
pub struct Desc {
    fd: RawFd,
    events: Event,
    token: u64,
}

impl Desc {
    pub fn new(fd: RawFd, events: Event) -> Self {
        Self {
            fd,
            events,
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// One-shot read interest on a listening socket.
    pub fn listener(listener: &TcpListener) -> Self {
        Self::new(listener.as_raw_fd(), Event::READ | Event::ONESHOT)
    }

    /// One-shot read interest on a connection, reporting peer hangup.
    pub fn read(stream: &TcpStream) -> Self {
        Self::new(
            stream.as_raw_fd(),
            Event::READ | Event::READ_HUP | Event::ONESHOT,
        )
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn events(&self) -> Event {
        self.events
    }

    pub(crate) fn token(&self) -> u64 {
        self.token
    }
}

/// Registration state of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescState {
    /// Waiting for the next event.
    Armed,
    /// A one-shot event was delivered; needs [`Poller::resume`].
    Delivered,
    /// Not registered.
    Stopped,
}
