//! Worker pool implementation.

use std::cell::Cell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::error::{PoolError, PoolResult};
use super::{PoolConfig, PoolStats};

/// Default worker thread name prefix.
const DEFAULT_NAME: &str = "wspoll-worker";

type Task = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    /// Address of the pool that owns the current thread (0 = none).
    static OWNER: Cell<usize> = const { Cell::new(0) };
}

/// Mutable pool state. Every admission decision is made under this lock.
struct State {
    backlog: VecDeque<Task>,
    live: usize,
    idle: usize,
    terminated: bool,
    handles: Vec<JoinHandle<()>>,
}

struct Shared {
    name: String,
    config: PoolConfig,
    state: Mutex<State>,
    /// Idle workers wait here for a backlog entry or termination.
    work: Condvar,
    /// Schedulers wait here for a handoff or spawn slot.
    admit: Condvar,
    /// `terminate` waits here for the last worker to exit.
    exited: Condvar,
    /// `End` observers wait here for termination to begin.
    ended: Condvar,
    next_worker: AtomicUsize,
}

/// A bounded pool of reusable worker threads.
///
/// Cloning is cheap; all clones schedule onto the same workers.
///
/// # Example
///
/// ```rust,ignore
/// use wspoll::pool::{PoolConfig, WorkerPool};
///
/// let pool = WorkerPool::new(PoolConfig::new(8, 16, 1))?;
/// pool.schedule(|| println!("hello from a worker"))?;
/// pool.terminate();
/// ```
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Create a pool, starting `config.prespawn` workers immediately.
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        Self::with_name(config, DEFAULT_NAME)
    }

    /// Create a pool whose worker threads are named `{name}-{id}`.
    pub fn with_name(config: PoolConfig, name: impl Into<String>) -> PoolResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            name: name.into(),
            config,
            state: Mutex::new(State {
                backlog: VecDeque::with_capacity(config.backlog),
                live: 0,
                idle: 0,
                terminated: false,
                handles: Vec::with_capacity(config.capacity),
            }),
            work: Condvar::new(),
            admit: Condvar::new(),
            exited: Condvar::new(),
            ended: Condvar::new(),
            next_worker: AtomicUsize::new(0),
        });

        let spawned = {
            let mut state = shared.state.lock();
            (0..config.prespawn).try_for_each(|_| shared.spawn(&mut state, None))
        };

        let pool = Self { shared };
        if let Err(e) = spawned {
            pool.terminate();
            return Err(e);
        }

        tracing::info!(
            pool = %pool.shared.name,
            capacity = config.capacity,
            backlog = config.backlog,
            prespawn = config.prespawn,
            "worker pool created"
        );

        Ok(pool)
    }

    /// Schedule `task` with no deadline.
    ///
    /// Blocks until the task is handed to a worker, queued, or the pool
    /// terminates. Never blocks for the duration of the task itself.
    pub fn schedule<F>(&self, task: F) -> PoolResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.schedule(Box::new(task), None)
    }

    /// Schedule `task`, giving up with [`PoolError::ScheduleTimeout`] if no
    /// worker or backlog slot frees up within `timeout`.
    ///
    /// A timeout too large to express as a deadline waits like [`schedule`](Self::schedule).
    pub fn schedule_timeout<F>(&self, timeout: Duration, task: F) -> PoolResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now().checked_add(timeout).map(|at| (at, timeout));
        self.shared.schedule(Box::new(task), deadline)
    }

    /// Stop admitting work and block until every worker has exited.
    ///
    /// Tasks already admitted (running or queued) run to completion.
    /// Safe to call more than once and from several threads; every caller
    /// returns only after the pool is fully drained. When called from one of
    /// the pool's own workers, that worker exits after its current task.
    pub fn terminate(&self) {
        let own = self.shared.is_current_worker();
        let handles = {
            let mut state = self.shared.state.lock();
            if !state.terminated {
                state.terminated = true;
                tracing::info!(
                    pool = %self.shared.name,
                    live = state.live,
                    queued = state.backlog.len(),
                    "terminating worker pool"
                );
                self.shared.work.notify_all();
                self.shared.admit.notify_all();
                self.shared.ended.notify_all();
            }

            let floor = usize::from(own);
            while state.live > floor {
                self.shared.exited.wait(&mut state);
            }
            state.backlog.clear();
            std::mem::take(&mut state.handles)
        };

        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::warn!(pool = %self.shared.name, "worker thread exited abnormally");
            }
        }
    }

    /// Termination signal that can be polled or waited on.
    pub fn end(&self) -> End {
        End {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether `terminate` has been called.
    pub fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminated
    }

    /// Snapshot of current occupancy.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            live: state.live,
            idle: state.idle,
            queued: state.backlog.len(),
            terminated: state.terminated,
        }
    }

    /// Pool configuration.
    pub fn config(&self) -> PoolConfig {
        self.shared.config
    }

    /// Get the pool name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.shared.name)
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Shared {
    fn schedule(
        self: &Arc<Self>,
        task: Task,
        deadline: Option<(Instant, Duration)>,
    ) -> PoolResult<()> {
        let mut state = self.state.lock();

        // All four outcomes are evaluated under the same lock on every
        // wakeup, so none of them can be missed between checks.
        loop {
            if state.terminated {
                return Err(PoolError::Terminated);
            }

            // An idle worker not yet claimed by an earlier handoff.
            if state.backlog.len() < state.idle {
                state.backlog.push_back(task);
                self.work.notify_one();
                return Ok(());
            }

            if state.live < self.config.capacity {
                return self.spawn(&mut state, Some(task));
            }

            if state.backlog.len() < self.config.backlog + state.idle {
                state.backlog.push_back(task);
                self.work.notify_one();
                return Ok(());
            }

            match deadline {
                Some((at, timeout)) => {
                    if Instant::now() >= at {
                        return Err(PoolError::ScheduleTimeout(timeout));
                    }
                    self.admit.wait_until(&mut state, at);
                }
                None => self.admit.wait(&mut state),
            }
        }
    }

    /// Start a worker. Caller holds the state lock and has checked capacity.
    fn spawn(self: &Arc<Self>, state: &mut State, task: Option<Task>) -> PoolResult<()> {
        let id = self.next_worker.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(self);

        let handle = thread::Builder::new()
            .name(format!("{}-{}", self.name, id))
            .spawn(move || shared.worker_loop(id, task))
            .map_err(|e| {
                tracing::error!(pool = %self.name, error = %e, "failed to spawn worker");
                PoolError::Spawn(e.to_string())
            })?;

        state.live += 1;
        state.handles.push(handle);
        Ok(())
    }

    /// Worker thread main loop.
    fn worker_loop(self: Arc<Self>, id: usize, mut task: Option<Task>) {
        OWNER.with(|owner| owner.set(Arc::as_ptr(&self) as usize));
        tracing::debug!(pool = %self.name, worker = id, "worker started");

        while let Some(job) = task.take().or_else(|| self.next_task()) {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
                tracing::error!(
                    pool = %self.name,
                    worker = id,
                    panic = panic_message(panic.as_ref()),
                    "task panicked"
                );
            }
        }

        {
            let mut state = self.state.lock();
            state.live -= 1;
            if state.live <= 1 {
                self.exited.notify_all();
            }
        }

        tracing::debug!(pool = %self.name, worker = id, "worker stopped");
    }

    /// Pull the next task, parking while the backlog is empty.
    ///
    /// Returns `None` once the backlog is drained and the pool terminated.
    fn next_task(&self) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.backlog.pop_front() {
                self.admit.notify_one();
                return Some(task);
            }
            if state.terminated {
                return None;
            }

            state.idle += 1;
            self.admit.notify_one();
            self.work.wait(&mut state);
            state.idle -= 1;
        }
    }

    fn is_current_worker(&self) -> bool {
        OWNER.with(|owner| owner.get() == self as *const Shared as usize)
    }
}

/// Termination signal of a [`WorkerPool`].
#[derive(Clone)]
pub struct End {
    shared: Arc<Shared>,
}

impl End {
    /// Whether termination has begun.
    pub fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminated
    }

    /// Block until termination begins.
    pub fn wait(&self) {
        let mut state = self.shared.state.lock();
        while !state.terminated {
            self.shared.ended.wait(&mut state);
        }
    }

    /// Block for at most `timeout`. Returns `true` if the pool terminated.
    ///
    /// Termination observed at the deadline still counts as terminated.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut state = self.shared.state.lock();
        while !state.terminated {
            if self.shared.ended.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.terminated
    }
}

impl std::fmt::Debug for End {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("End")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
