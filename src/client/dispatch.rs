// src/client/dispatch.rs

//! Inbound dispatch.
//!
//! The [`Dispatcher`] is the only consumer of inbound frames. For each frame
//! it decodes the envelope, filters for replies, takes the matching
//! responder out of the registry and runs it.
//!
//! # Error containment
//!
//! Nothing that happens while handling one frame can stop the next one from
//! being handled:
//!
//! - a frame that fails to decode is reported and dropped
//! - a reply with no pending responder is dropped quietly (late, duplicate
//!   or stray replies are expected)
//! - a responder that returns an error or panics is reported and forgotten
//!
//! Reports go to an injectable [`ErrorSink`]; [`LogErrorSink`] is the default.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::registry::ResponderRegistry;
use crate::protocol::EnvelopeCodec;
use crate::{Envelope, MessageKind, RpcError, SeqId};

/// A failure contained at the dispatch boundary.
#[derive(Debug)]
pub enum DispatchFault<'a> {
    /// An inbound frame could not be decoded.
    Malformed { frame: &'a str, error: &'a RpcError },

    /// A responder returned an error.
    ResponderFailed {
        seq_id: SeqId,
        iface: &'a str,
        method: &'a str,
        error: &'a RpcError,
    },

    /// A responder panicked.
    ResponderPanicked {
        seq_id: SeqId,
        iface: &'a str,
        method: &'a str,
        message: &'a str,
    },
}

/// Destination for faults the dispatcher swallows.
pub trait ErrorSink: Send + Sync {
    fn report(&self, fault: DispatchFault<'_>);
}

/// Longest frame prefix written at `warn`; the whole frame goes to `trace`.
const FRAME_PREVIEW_LEN: usize = 128;

/// Writes every fault to the crate log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, fault: DispatchFault<'_>) {
        // ---
        match fault {
            DispatchFault::Malformed { frame, error } => {
                crate::log_warn!(
                    "dropping malformed frame ({error}, {} bytes): {}",
                    frame.len(),
                    frame_preview(frame)
                );
                crate::log_trace!("malformed frame: {frame}");
            }
            DispatchFault::ResponderFailed {
                seq_id,
                iface,
                method,
                error,
            } => {
                crate::log_error!("responder for {iface}.{method} (seq_id {seq_id}) failed: {error}");
            }
            DispatchFault::ResponderPanicked {
                seq_id,
                iface,
                method,
                message,
            } => {
                crate::log_error!(
                    "responder for {iface}.{method} (seq_id {seq_id}) panicked: {message}"
                );
            }
        }
    }
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The reply reached its responder and the responder returned `Ok`.
    Delivered(SeqId),

    /// The reply reached its responder, which failed or panicked.
    ResponderFailed(SeqId),

    /// No responder was pending for this id.
    Unmatched(SeqId),

    /// The envelope was not a response.
    Ignored(MessageKind),

    /// The frame did not decode.
    Malformed,
}

/// Routes inbound replies to exactly one pending responder.
pub struct Dispatcher {
    // ---
    registry: Arc<ResponderRegistry>,
    codec: Arc<dyn EnvelopeCodec>,
    sink: Arc<dyn ErrorSink>,
}

impl Dispatcher {
    // ---
    pub fn new(
        registry: Arc<ResponderRegistry>,
        codec: Arc<dyn EnvelopeCodec>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            registry,
            codec,
            sink,
        }
    }

    /// Decode one inbound frame and dispatch it.
    pub fn on_inbound_frame(&self, frame: &str) -> DispatchOutcome {
        // ---
        match self.codec.decode(frame) {
            Ok(env) => self.on_inbound_envelope(env),
            Err(error) => {
                self.sink.report(DispatchFault::Malformed {
                    frame,
                    error: &error,
                });
                DispatchOutcome::Malformed
            }
        }
    }

    /// Dispatch one decoded envelope.
    pub fn on_inbound_envelope(&self, env: Envelope) -> DispatchOutcome {
        // ---
        if !env.is_response() {
            crate::log_debug!("ignoring inbound {:?} envelope (seq_id {})", env.kind, env.seq_id);
            return DispatchOutcome::Ignored(env.kind);
        }

        let seq_id = env.seq_id;

        let Some(responder) = self.registry.take_and_remove(seq_id) else {
            crate::log_debug!("no pending responder for seq_id {seq_id}");
            return DispatchOutcome::Unmatched(seq_id);
        };

        let reply = env.into_reply();
        let iface = reply.iface.clone();
        let method = reply.method.clone();

        match panic::catch_unwind(AssertUnwindSafe(move || responder.deliver(reply))) {
            Ok(Ok(())) => DispatchOutcome::Delivered(seq_id),
            Ok(Err(error)) => {
                self.sink.report(DispatchFault::ResponderFailed {
                    seq_id,
                    iface: &iface,
                    method: &method,
                    error: &error,
                });
                DispatchOutcome::ResponderFailed(seq_id)
            }
            Err(panic_payload) => {
                let message = panic_message(panic_payload.as_ref());
                self.sink.report(DispatchFault::ResponderPanicked {
                    seq_id,
                    iface: &iface,
                    method: &method,
                    message: &message,
                });
                DispatchOutcome::ResponderFailed(seq_id)
            }
        }
    }
}

/// At most [`FRAME_PREVIEW_LEN`] bytes of `frame`, cut on a char boundary.
#[cfg_attr(not(feature = "logging"), allow(dead_code))]
fn frame_preview(frame: &str) -> &str {
    // ---
    if frame.len() <= FRAME_PREVIEW_LEN {
        return frame;
    }
    let mut end = FRAME_PREVIEW_LEN;
    while !frame.is_char_boundary(end) {
        end -= 1;
    }
    &frame[..end]
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    // ---
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
