// src/transport/memory.rs

//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended primarily for testing and as a reference
//! for transport semantics.
//!
//! ## Reference Semantics
//!
//! - Frames queued by the client are seen by the peer in queue order.
//! - Frames sent by the peer reach the client's inbound loop in send order.
//! - Nothing is dropped due to timing, scheduling, or background IO.
//! - `open()` succeeds exactly once; the link cannot be reopened.
//!
//! ## The peer
//!
//! [`MemoryPeer`] stands in for the remote device. It reads the client's
//! commands and writes replies, raw frames, errors or a close back.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::protocol::{EnvelopeCodec, JsonCodec};
use crate::{
    // ---
    Envelope,
    Link,
    LinkEvent,
    Outbound,
    Payload,
    Result,
    RpcError,
    Transport,
    TransportPtr,
};

/// In-memory transport.
///
/// Holds the client half of a channel pair until `open()` hands it out.
struct MemoryTransport {
    // ---
    link: Mutex<Option<Link>>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self) -> Result<Link> {
        // ---
        let mut slot = match self.link.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        slot.take()
            .ok_or_else(|| RpcError::Transport("memory link already opened".into()))
    }
}

/// Remote end of an in-memory link.
pub struct MemoryPeer {
    // ---
    from_client: mpsc::UnboundedReceiver<Outbound>,
    to_client: mpsc::UnboundedSender<LinkEvent>,
    codec: JsonCodec,
}

impl MemoryPeer {
    // ---
    /// Wait for the next command the client sends.
    ///
    /// Returns `None` once the client asks to close (a local close event is
    /// then reported to the client) or drops its end. Frames that do not
    /// decode are skipped.
    pub async fn next_command(&mut self) -> Option<Envelope> {
        // ---
        loop {
            let outbound = self.from_client.recv().await?;
            if let Some(step) = self.accept(outbound) {
                return step;
            }
        }
    }

    /// Blocking variant of [`next_command`](Self::next_command) for use
    /// from plain threads.
    pub fn blocking_next_command(&mut self) -> Option<Envelope> {
        // ---
        loop {
            let outbound = self.from_client.blocking_recv()?;
            if let Some(step) = self.accept(outbound) {
                return step;
            }
        }
    }

    /// Next raw frame the client queued, without decoding it.
    pub async fn next_frame(&mut self) -> Option<String> {
        // ---
        match self.from_client.recv().await? {
            Outbound::Frame(frame) => Some(frame),
            Outbound::Close => {
                self.report_local_close();
                None
            }
        }
    }

    /// Reply to `command` with `value`, echoing its id, iface and method.
    pub fn reply<T: Serialize + ?Sized>(&self, command: &Envelope, value: &T) -> Result<()> {
        // ---
        let env = Envelope::response(
            command.seq_id,
            command.iface.clone(),
            command.method.clone(),
            Payload::from_serializable(value)?,
        );
        self.send_envelope(&env)
    }

    pub fn send_envelope(&self, env: &Envelope) -> Result<()> {
        let frame = self.codec.encode(env)?;
        self.send_frame(frame)
    }

    /// Push a raw text frame to the client.
    pub fn send_frame(&self, frame: impl Into<String>) -> Result<()> {
        // ---
        self.to_client
            .send(LinkEvent::Frame(frame.into()))
            .map_err(|_| RpcError::ConnectionClosed)
    }

    /// Report a transport error to the client.
    pub fn fail(&self, err: RpcError) -> Result<()> {
        self.to_client
            .send(LinkEvent::Error(err))
            .map_err(|_| RpcError::ConnectionClosed)
    }

    /// Close the link from the peer's side.
    ///
    /// The client's hooks see a remote close. The link stays usable for
    /// frames until the peer is dropped, mirroring a half-torn-down socket.
    pub fn close(&self, code: u16, reason: &str) -> Result<()> {
        // ---
        self.to_client
            .send(LinkEvent::Closed {
                code: Some(code),
                reason: reason.to_string(),
                remote: true,
            })
            .map_err(|_| RpcError::ConnectionClosed)
    }

    fn accept(&self, outbound: Outbound) -> Option<Option<Envelope>> {
        // ---
        match outbound {
            Outbound::Frame(frame) => match self.codec.decode(&frame) {
                Ok(env) => Some(Some(env)),
                Err(_err) => {
                    crate::log_warn!("memory peer skipping undecodable frame: {_err}");
                    None
                }
            },
            Outbound::Close => {
                self.report_local_close();
                Some(None)
            }
        }
    }

    fn report_local_close(&self) {
        let _ = self.to_client.send(LinkEvent::Closed {
            code: Some(1000),
            reason: String::new(),
            remote: false,
        });
    }
}

/// Create a new in-memory transport and the peer that drives its far end.
///
/// This transport is always available and requires no external resources.
pub fn create_memory_transport() -> (TransportPtr, MemoryPeer) {
    // ---
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    let transport = MemoryTransport {
        link: Mutex::new(Some(Link {
            outbound: out_tx,
            inbound: in_rx,
        })),
    };

    let peer = MemoryPeer {
        from_client: out_rx,
        to_client: in_tx,
        codec: JsonCodec,
    };

    (Arc::new(transport), peer)
}
