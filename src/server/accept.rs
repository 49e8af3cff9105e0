//! Accept loop.
//!
//! Each listener readiness event schedules a single accept on the pool with
//! a short timeout, waits for the accept outcome, and decides whether to
//! re-arm the listener now, after a cooldown, or never.

use std::io;
use std::net::TcpListener;
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;

use super::{conn, Context};
use crate::error::{Error, Result};
use crate::poller::{Desc, Event, Poller};
use crate::pool::PoolError;

/// What the listener does after one accept attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AcceptStep {
    /// Re-arm immediately.
    Resume,
    /// Wait out the cooldown, then re-arm unless the pool terminates.
    Cooldown,
    /// Deregister the listener for good.
    Stop,
    /// Hand the error to the handler, then re-arm.
    Report,
}

pub(crate) fn accept_step(outcome: &Result<()>) -> AcceptStep {
    match outcome {
        Ok(()) => AcceptStep::Resume,
        Err(Error::Pool(PoolError::Terminated)) => AcceptStep::Stop,
        Err(Error::Pool(PoolError::ScheduleTimeout(_))) | Err(Error::Pool(PoolError::Spawn(_))) => {
            AcceptStep::Cooldown
        }
        // Another event raced us to the pending connection.
        Err(Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => AcceptStep::Resume,
        Err(e) if e.is_temporary() => AcceptStep::Cooldown,
        Err(_) => AcceptStep::Report,
    }
}

/// A listening socket registered with the accept poller.
pub(crate) struct Acceptor {
    listener: TcpListener,
    desc: Desc,
    poller: Poller,
    ctx: Arc<Context>,
}

impl Acceptor {
    pub(crate) fn new(listener: TcpListener, poller: Poller, ctx: Arc<Context>) -> Self {
        Self {
            desc: Desc::listener(&listener),
            listener,
            poller,
            ctx,
        }
    }

    pub(crate) fn desc(&self) -> &Desc {
        &self.desc
    }

    pub(crate) fn on_event(self: &Arc<Self>, event: Event) {
        if event.contains(Event::POLLER_CLOSED) {
            return;
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let acceptor = Arc::clone(self);
        let outcome = self
            .ctx
            .pool
            .schedule_timeout(self.ctx.config.accept_timeout, move || acceptor.accept_one(tx))
            .map_err(Error::from)
            // A task that died before reporting counts as a clean accept.
            .and_then(|()| rx.recv().unwrap_or(Ok(())));

        match accept_step(&outcome) {
            AcceptStep::Resume => self.resume(),
            AcceptStep::Cooldown => {
                if let Err(e) = &outcome {
                    tracing::debug!(error = %e, cooldown = ?self.ctx.config.cooldown, "accept cooldown");
                }
                if self.ctx.pool.end().wait_timeout(self.ctx.config.cooldown) {
                    self.stop();
                } else {
                    self.resume();
                }
            }
            AcceptStep::Stop => self.stop(),
            AcceptStep::Report => {
                if let Err(e) = &outcome {
                    self.ctx.handler.on_error(e, None);
                }
                self.resume();
            }
        }
    }

    /// Runs on a worker. The outcome is reported before the handshake so
    /// the listener can re-arm while the connection is being set up.
    fn accept_one(&self, outcome: SyncSender<Result<()>>) {
        let (stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) => {
                let _ = outcome.send(Err(e.into()));
                return;
            }
        };
        let _ = outcome.send(Ok(()));

        if let Err(e) = conn::open(&self.ctx, stream, Some(peer)) {
            self.ctx.handler.on_error(&e, None);
        }
    }

    fn resume(&self) {
        if let Err(e) = self.poller.resume(&self.desc) {
            tracing::error!(error = %e, "failed to re-arm listener");
        }
    }

    fn stop(&self) {
        tracing::info!(addr = ?self.listener.local_addr().ok(), "listener stopped");
        if let Err(e) = self.poller.stop(&self.desc) {
            tracing::debug!(error = %e, "failed to deregister listener");
        }
    }
}
