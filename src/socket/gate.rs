//! Exclusivity gate.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Binary lock that may be released by a different call than the one that
/// took it.
///
/// A read window acquires the gate, leaks the guard, and hands the release
/// to a [`Resume`](super::Resume) capability.
pub(crate) struct Gate {
    locked: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            locked: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Block until the gate is free, then take it.
    pub(crate) fn acquire(&self) -> GateGuard<'_> {
        let mut locked = self.locked.lock();
        while *locked {
            self.cond.wait(&mut locked);
        }
        *locked = true;
        GateGuard { gate: self }
    }

    /// Take the gate if it frees up within `timeout`.
    pub(crate) fn try_acquire_for(&self, timeout: Duration) -> Option<GateGuard<'_>> {
        let mut locked = self.locked.lock();
        if *locked {
            let _ = self
                .cond
                .wait_while_for(&mut locked, |locked| *locked, timeout);
            if *locked {
                return None;
            }
        }
        *locked = true;
        Some(GateGuard { gate: self })
    }

    /// Free the gate. Must pair with a leaked guard.
    pub(crate) fn release(&self) {
        let mut locked = self.locked.lock();
        *locked = false;
        drop(locked);
        self.cond.notify_one();
    }

    pub(crate) fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}

/// Holds the gate until dropped or leaked.
pub(crate) struct GateGuard<'a> {
    gate: &'a Gate,
}

impl GateGuard<'_> {
    /// Keep the gate held past the guard's scope.
    pub(crate) fn leak(self) {
        std::mem::forget(self);
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_guard_releases_on_drop() {
        let gate = Gate::new();
        {
            let _guard = gate.acquire();
            assert!(gate.is_locked());
            assert!(gate.try_acquire_for(Duration::from_millis(10)).is_none());
        }
        assert!(!gate.is_locked());
    }

    #[test]
    fn test_leaked_guard_needs_release() {
        let gate = Gate::new();
        gate.acquire().leak();
        assert!(gate.is_locked());
        gate.release();
        assert!(gate.try_acquire_for(Duration::from_millis(10)).is_some());
    }

    #[test]
    fn test_release_from_other_thread_wakes_waiter() {
        let gate = Arc::new(Gate::new());
        gate.acquire().leak();

        let waiter = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                let _guard = gate.acquire();
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());
        gate.release();
        waiter.join().unwrap();
        assert!(!gate.is_locked());
    }
}
