// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the duplex link the client runs over. It intentionally
//! avoids any reference to concrete protocols or client libraries.
//!
//! A transport is responsible only for moving opaque text frames in both
//! directions and for reporting lifecycle events. Higher-level semantics such
//! as sequence correlation, dispatch, or blocking waits are handled elsewhere.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{Result, RpcError};

/// Something the client asks the link to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One encoded envelope.
    Frame(String),

    /// Begin an orderly close.
    Close,
}

/// Something the link observed.
#[derive(Debug)]
pub enum LinkEvent {
    /// One inbound text frame, in arrival order.
    Frame(String),

    /// The link closed. `remote` is true when the peer initiated it.
    Closed {
        code: Option<u16>,
        reason: String,
        remote: bool,
    },

    /// The link reported an error. A `Closed` event normally follows.
    Error(RpcError),
}

/// An open duplex link.
///
/// `outbound` is unbounded: queueing a frame never blocks the caller, which
/// lets blocking callers send without being inside a runtime.
pub struct Link {
    // ---
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Transport abstraction.
///
/// `open()` establishes the link and returns its two channel ends. Each call
/// opens a fresh link; the client calls it exactly once.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat `open` as a normal
/// `async fn`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Open the link.
    async fn open(&self) -> Result<Link>;
}

/// Shared transport pointer.
pub type TransportPtr = Arc<dyn Transport>;

/// Lifecycle callbacks for the owning layer.
///
/// Every method defaults to a no-op. Hooks run on the inbound-processing
/// task, so they must not block.
pub trait ConnectionHooks: Send + Sync {
    fn on_open(&self) {}

    fn on_close(&self, _code: Option<u16>, _reason: &str, _remote: bool) {}

    fn on_error(&self, _err: &RpcError) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ConnectionHooks for NoHooks {}

/// Shared hooks pointer.
pub type HooksPtr = Arc<dyn ConnectionHooks>;
