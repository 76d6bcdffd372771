//! Inbound-processing loop.
//!
//! This module is the glue between an open [`Link`](crate::Link) and the
//! client's [`Dispatcher`]. One task per connection drains the link's
//! inbound channel in arrival order:
//!
//! - frames go to the dispatcher, which contains every per-frame failure
//! - close and error events go to the owning layer's [`ConnectionHooks`]
//!
//! Responders and hooks run on this task, so a slow one delays every frame
//! behind it. Blocking callers are never parked here; they park on their own
//! threads.
//!
//! The loop ends when the transport drops its end of the inbound channel.
//! Pending calls are not touched when that happens.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::Dispatcher;
use crate::{ConnectionHooks, HooksPtr, LinkEvent};

/// Start the inbound loop for one link.
pub(crate) fn spawn(
    inbound: mpsc::UnboundedReceiver<LinkEvent>,
    dispatcher: Dispatcher,
    hooks: HooksPtr,
    frame_logging: bool,
) -> JoinHandle<()> {
    // ---
    tokio::spawn(run(inbound, dispatcher, hooks, frame_logging))
}

async fn run(
    mut inbound: mpsc::UnboundedReceiver<LinkEvent>,
    dispatcher: Dispatcher,
    hooks: HooksPtr,
    frame_logging: bool,
) {
    // ---
    crate::log_debug!("inbound loop started");

    while let Some(event) = inbound.recv().await {
        handle_event(event, &dispatcher, hooks.as_ref(), frame_logging);
    }

    crate::log_debug!("inbound loop stopped: link dropped");
}

fn handle_event(
    event: LinkEvent,
    dispatcher: &Dispatcher,
    hooks: &dyn ConnectionHooks,
    frame_logging: bool,
) {
    // ---
    match event {
        LinkEvent::Frame(frame) => {
            if frame_logging {
                crate::log_trace!("<- {frame}");
            }
            let _outcome = dispatcher.on_inbound_frame(&frame);
        }
        LinkEvent::Closed {
            code,
            reason,
            remote,
        } => {
            crate::log_info!("link closed (code {code:?}, reason {reason:?}, remote {remote})");
            hooks.on_close(code, &reason, remote);
        }
        LinkEvent::Error(err) => {
            crate::log_warn!("link error: {err}");
            hooks.on_error(&err);
        }
    }
}
