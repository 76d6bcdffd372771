// src/client/sync_call.rs

//! Blocking call adapter.
//!
//! A [`SyncCall`] is created when a command is issued. It owns the receiving
//! half of a one-shot completion whose sending half sits in the registry as
//! the command's responder. The dispatcher fulfils the completion from the
//! inbound task; the issuing thread parks on [`SyncCall::wait`] until then.
//!
//! Each call has its own completion, so one thread may hold any number of
//! outstanding calls and wait on them in any order.
//!
//! # Context rule
//!
//! `wait` must run on the thread that issued the call. Plain threads,
//! `spawn_blocking` threads and multi-thread runtime workers may all block;
//! on a worker the wait goes through `block_in_place` so the rest of the
//! runtime keeps running. A current-thread runtime is refused: its driver
//! thread cannot be told apart from its blocking pool, and parking the
//! driver would stall the inbound loop for good.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::oneshot;

use super::registry::ResponderRegistry;
use super::responder::Responder;
use crate::{Reply, Result, RpcError, SeqId};

/// Responder that fulfils a one-shot completion.
pub(crate) struct CompletionResponder {
    tx: oneshot::Sender<Reply>,
}

impl CompletionResponder {
    pub(crate) fn new(tx: oneshot::Sender<Reply>) -> Self {
        Self { tx }
    }
}

impl Responder for CompletionResponder {
    fn deliver(self: Box<Self>, reply: Reply) -> Result<()> {
        // ---
        if self.tx.send(reply).is_err() {
            crate::log_debug!("reply arrived after the call was abandoned");
        }
        Ok(())
    }
}

/// Fail fast when parking this thread could stall a runtime.
pub(crate) fn ensure_blocking_allowed() -> Result<()> {
    // ---
    match Handle::try_current() {
        Err(_) => Ok(()),
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => Ok(()),
            _ => Err(RpcError::BlockingInAsyncContext),
        },
    }
}

/// Run a blocking wait, handing a runtime worker's core off first.
///
/// Outside a worker `block_in_place` runs `f` directly.
fn park<T>(f: impl FnOnce() -> T) -> T {
    tokio::task::block_in_place(f)
}

/// An issued command whose reply the issuing thread can block on.
///
/// Returned by [`RpcClient::begin_call`](crate::RpcClient::begin_call).
/// Dropping it without waiting leaves the command registered; a late reply
/// is then discarded.
pub struct SyncCall {
    // ---
    seq_id: SeqId,
    origin: ThreadId,
    rx: oneshot::Receiver<Reply>,
    registry: Arc<ResponderRegistry>,
    runtime: Handle,
}

impl SyncCall {
    // ---
    pub(crate) fn new(
        seq_id: SeqId,
        rx: oneshot::Receiver<Reply>,
        registry: Arc<ResponderRegistry>,
        runtime: Handle,
    ) -> Self {
        Self {
            seq_id,
            origin: thread::current().id(),
            rx,
            registry,
            runtime,
        }
    }

    pub fn seq_id(&self) -> SeqId {
        self.seq_id
    }

    /// Block until the reply arrives. No deadline.
    ///
    /// # Errors
    ///
    /// - [`RpcError::WrongContext`] if called on another thread than the one
    ///   that issued the call
    /// - [`RpcError::BlockingInAsyncContext`] if called inside a
    ///   current-thread runtime
    /// - [`RpcError::ConnectionClosed`] if the pending call was abandoned
    pub fn wait(self) -> Result<Reply> {
        // ---
        self.check_context()?;
        let rx = self.rx;
        park(move || rx.blocking_recv()).map_err(|_| RpcError::ConnectionClosed)
    }

    /// Block until the reply arrives or `deadline` elapses.
    ///
    /// On expiry the pending entry is removed, so a late reply is dropped by
    /// the dispatcher as unmatched.
    ///
    /// # Errors
    ///
    /// As [`wait`](Self::wait), plus [`RpcError::Timeout`].
    pub fn wait_timeout(self, deadline: Duration) -> Result<Reply> {
        // ---
        self.check_context()?;

        let SyncCall {
            seq_id,
            rx,
            registry,
            runtime,
            ..
        } = self;

        let waited = park(move || runtime.block_on(tokio::time::timeout(deadline, rx)));

        match waited {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => {
                registry.take_and_remove(seq_id);
                crate::log_debug!("seq_id {seq_id} timed out after {deadline:?}");
                Err(RpcError::Timeout)
            }
        }
    }

    fn check_context(&self) -> Result<()> {
        // ---
        let actual = thread::current().id();
        if actual != self.origin {
            return Err(RpcError::WrongContext {
                expected: self.origin,
                actual,
            });
        }
        ensure_blocking_allowed()
    }
}

impl std::fmt::Debug for SyncCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCall")
            .field("seq_id", &self.seq_id)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
