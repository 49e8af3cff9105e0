//! epoll-backed poller.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::{Desc, DescState, Event};

const WAKE_TOKEN: u64 = 0;
const MAX_EVENTS: usize = 128;

type Callback = Arc<dyn Fn(Event) + Send + Sync + 'static>;

struct Registration {
    fd: RawFd,
    events: Event,
    state: DescState,
    callback: Callback,
}

struct Inner {
    name: String,
    epoll_fd: RawFd,
    /// Eventfd that interrupts `epoll_wait` on close.
    wake_fd: RawFd,
    registrations: Mutex<HashMap<u64, Registration>>,
    closed: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Readiness notifier served by one dedicated thread.
///
/// Callbacks run on the poller thread, one at a time. A callback that
/// blocks delays every other descriptor on the same poller.
///
/// The thread keeps the poller alive until [`Poller::close`] is called.
#[derive(Clone)]
pub struct Poller {
    inner: Arc<Inner>,
}

impl Poller {
    /// Create an epoll instance and start its thread, named `{name}-poller`.
    pub fn new(name: impl Into<String>) -> io::Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        let wake_fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if wake_fd < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll_fd) };
            return Err(err);
        }

        let inner = Arc::new(Inner {
            name: name.into(),
            epoll_fd,
            wake_fd,
            registrations: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            thread: Mutex::new(None),
        });

        inner.ctl(libc::EPOLL_CTL_ADD, wake_fd, libc::EPOLLIN as u32, WAKE_TOKEN)?;

        let runner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(format!("{}-poller", inner.name))
            .spawn(move || runner.run())?;
        *inner.thread.lock() = Some(handle);

        tracing::debug!(poller = %inner.name, "poller started");

        Ok(Self { inner })
    }

    /// Register `desc`; `callback` runs on the poller thread for each event.
    pub fn start<F>(&self, desc: &Desc, callback: F) -> io::Result<()>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::Other, "poller is closed"));
        }

        let mut registrations = self.inner.registrations.lock();
        if registrations.contains_key(&desc.token()) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "descriptor is already registered",
            ));
        }

        self.inner.ctl(
            libc::EPOLL_CTL_ADD,
            desc.fd(),
            desc.events().to_epoll(),
            desc.token(),
        )?;

        registrations.insert(
            desc.token(),
            Registration {
                fd: desc.fd(),
                events: desc.events(),
                state: DescState::Armed,
                callback: Arc::new(callback),
            },
        );
        Ok(())
    }

    /// Deregister `desc`. No further callbacks are started for it.
    pub fn stop(&self, desc: &Desc) -> io::Result<()> {
        let removed = self.inner.registrations.lock().remove(&desc.token());
        match removed {
            Some(reg) => self.inner.delete(reg.fd),
            None => Ok(()),
        }
    }

    /// Re-arm a one-shot descriptor after its event was delivered.
    ///
    /// Does nothing if the descriptor is stopped or already armed.
    pub fn resume(&self, desc: &Desc) -> io::Result<()> {
        let mut registrations = self.inner.registrations.lock();
        let reg = match registrations.get_mut(&desc.token()) {
            Some(reg) if reg.state == DescState::Delivered => reg,
            _ => return Ok(()),
        };

        self.inner
            .ctl(libc::EPOLL_CTL_MOD, reg.fd, reg.events.to_epoll(), desc.token())?;
        reg.state = DescState::Armed;
        Ok(())
    }

    /// Current registration state of `desc`.
    pub fn state(&self, desc: &Desc) -> DescState {
        self.inner
            .registrations
            .lock()
            .get(&desc.token())
            .map(|reg| reg.state)
            .unwrap_or(DescState::Stopped)
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.inner.registrations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Stop the poller thread and deliver [`Event::POLLER_CLOSED`] to every
    /// remaining registration. Only the first call has any effect.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.wake();

        let handle = self.inner.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!(poller = %self.inner.name, "poller thread exited abnormally");
            }
        }

        let remaining: Vec<Registration> = self
            .inner
            .registrations
            .lock()
            .drain()
            .map(|(_, reg)| reg)
            .collect();

        tracing::debug!(
            poller = %self.inner.name,
            remaining = remaining.len(),
            "poller closed"
        );

        for reg in &remaining {
            let _ = self.inner.delete(reg.fd);
        }
        for reg in remaining {
            self.inner.deliver(&reg.callback, Event::POLLER_CLOSED);
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("name", &self.inner.name)
            .field("registrations", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Inner {
    fn run(self: Arc<Self>) {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];

        loop {
            let n = unsafe {
                libc::epoll_wait(self.epoll_fd, events.as_mut_ptr(), MAX_EVENTS as i32, -1)
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(poller = %self.name, error = %err, "epoll_wait failed");
                break;
            }

            let mut ready = Vec::with_capacity(n as usize);
            {
                let mut registrations = self.registrations.lock();
                for ev in &events[..n as usize] {
                    let (token, bits) = (ev.u64, ev.events);
                    if token == WAKE_TOKEN {
                        self.drain_wake();
                        continue;
                    }

                    let reg = match registrations.get_mut(&token) {
                        Some(reg) => reg,
                        None => continue,
                    };
                    if reg.events.contains(Event::ONESHOT) {
                        if reg.state != DescState::Armed {
                            continue;
                        }
                        reg.state = DescState::Delivered;
                    }
                    ready.push((Arc::clone(&reg.callback), Event::from_epoll(bits)));
                }
            }

            if self.closed.load(Ordering::Acquire) {
                break;
            }

            for (callback, event) in ready {
                self.deliver(&callback, event);
            }
        }

        tracing::debug!(poller = %self.name, "poller thread stopped");
    }

    fn deliver(&self, callback: &Callback, event: Event) {
        if panic::catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            tracing::error!(poller = %self.name, ?event, "poller callback panicked");
        }
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32, token: u64) -> io::Result<()> {
        let mut ev = libc::epoll_event { events, u64: token };
        let ret = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut ev) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn delete(&self, fd: RawFd) -> io::Result<()> {
        let ret =
            unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // Already gone if the descriptor was closed first.
            if !matches!(err.raw_os_error(), Some(libc::ENOENT) | Some(libc::EBADF)) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn wake(&self) {
        let val: u64 = 1;
        unsafe {
            libc::write(self.wake_fd, &val as *const u64 as *const libc::c_void, 8);
        }
    }

    fn drain_wake(&self) {
        let mut buf = [0u8; 8];
        unsafe {
            libc::read(self.wake_fd, buf.as_mut_ptr() as *mut libc::c_void, 8);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wake_fd);
            libc::close(self.epoll_fd);
        }
    }
}
