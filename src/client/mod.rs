// src/client/mod.rs
//! Command client.
//!
//! This module contains [`RpcClient`], which issues named commands over a
//! duplex link and correlates each reply back to its caller.
//!
//! # Architecture
//!
//! The client opens its transport once and runs a background inbound loop
//! that feeds every frame to a [`Dispatcher`]. Each command takes a fresh
//! sequence id, registers a responder under that id, and is then queued on
//! the link. When the reply arrives, the dispatcher removes the responder
//! and runs it.
//!
//! Blocking calls register a one-shot completion as their responder and park
//! the issuing thread on it (see [`SyncCall`]). Async calls await the same
//! completion.
//!
//! # Concurrency
//!
//! Any number of threads and tasks may issue commands at once. The registry
//! lock is held only for the insert or the take-remove itself.
//!
//! # Limitations
//!
//! There is no default timeout and no automatic sweep when the link closes:
//! a call whose reply never arrives stays pending. Use
//! [`SyncCall::wait_timeout`], [`RpcClient::call_with_timeout`] or
//! [`RpcClient::abandon_pending`] when that matters.

mod dispatch;
mod registry;
mod responder;
mod sync_call;

pub use dispatch::{DispatchFault, DispatchOutcome, Dispatcher, ErrorSink, LogErrorSink};
pub use registry::ResponderRegistry;
pub use responder::{BoxedResponder, Responder};
pub use sync_call::SyncCall;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;

use sync_call::{ensure_blocking_allowed, CompletionResponder};

use crate::protocol::{EnvelopeCodec, JsonCodec};
use crate::{
    // ---
    ConnectionConfig,
    ConnectionHooks,
    Envelope,
    HooksPtr,
    NoHooks,
    Outbound,
    Payload,
    Reply,
    Result,
    RpcError,
    SeqAllocator,
    SeqId,
    TransportPtr,
};

/// Running client instance.
///
/// Cheap to clone (internally `Arc`-backed). All clones share one link, one
/// sequence allocator and one registry.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    outbound: mpsc::UnboundedSender<Outbound>,
    registry: Arc<ResponderRegistry>,
    seq: SeqAllocator,
    codec: Arc<dyn EnvelopeCodec>,
    runtime: Handle,

    /// Inbound loop handle.
    ///
    /// Kept so the task isn't detached from the client; the loop ends on its
    /// own when the link's inbound channel closes.
    _rx_task: JoinHandle<()>,
}

/// Builder for [`RpcClient`].
///
/// # Example
///
/// ```no_run
/// use amplink_rpc::{create_websocket_transport, ConnectionConfig, RpcClient, TrustPolicy};
///
/// # async fn example() -> amplink_rpc::Result<()> {
/// let config = ConnectionConfig::new("192.168.114.1", TrustPolicy::AcceptAnyCertificate);
/// let transport = create_websocket_transport(config)?;
///
/// let client = RpcClient::builder(transport).build().await?;
/// let status = client
///     .call_value("Router", "getStatus", &serde_json::json!({}))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct RpcClientBuilder {
    // ---
    transport: TransportPtr,
    hooks: HooksPtr,
    error_sink: Arc<dyn ErrorSink>,
    codec: Arc<dyn EnvelopeCodec>,
    frame_logging: bool,
}

impl RpcClientBuilder {
    // ---
    pub fn new(transport: TransportPtr) -> Self {
        Self {
            transport,
            hooks: Arc::new(NoHooks),
            error_sink: Arc::new(LogErrorSink),
            codec: Arc::new(JsonCodec),
            frame_logging: false,
        }
    }

    /// Lifecycle hooks for open, close and error events. Default: no-ops.
    pub fn hooks(mut self, hooks: impl ConnectionHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Where dispatch-time faults are reported. Default: [`LogErrorSink`].
    pub fn error_sink(mut self, sink: impl ErrorSink + 'static) -> Self {
        self.error_sink = Arc::new(sink);
        self
    }

    /// Envelope codec. Default: [`JsonCodec`].
    pub fn codec(mut self, codec: impl EnvelopeCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Log every raw inbound frame at trace level.
    pub fn frame_logging(mut self, enabled: bool) -> Self {
        self.frame_logging = enabled;
        self
    }

    /// Open the transport and start the inbound loop.
    ///
    /// Must be called from within a Tokio runtime; the runtime must outlive
    /// the client.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the link cannot be opened. The
    /// error is also passed to [`ConnectionHooks::on_error`].
    pub async fn build(self) -> Result<RpcClient> {
        // ---
        let link = match self.transport.open().await {
            Ok(link) => link,
            Err(err) => {
                crate::log_error!("failed to open {} link: {err}", self.transport.name());
                self.hooks.on_error(&err);
                return Err(err);
            }
        };

        crate::log_info!("{} link open", self.transport.name());
        self.hooks.on_open();

        let registry = Arc::new(ResponderRegistry::new());
        let dispatcher = Dispatcher::new(registry.clone(), self.codec.clone(), self.error_sink);

        let rx_task = crate::transport::runner::spawn(
            link.inbound,
            dispatcher,
            self.hooks,
            self.frame_logging,
        );

        Ok(RpcClient {
            inner: Arc::new(Inner {
                outbound: link.outbound,
                registry,
                seq: SeqAllocator::new(),
                codec: self.codec,
                runtime: Handle::current(),
                _rx_task: rx_task,
            }),
        })
    }
}

impl RpcClient {
    // ---
    /// Start building a client over `transport`.
    pub fn builder(transport: TransportPtr) -> RpcClientBuilder {
        RpcClientBuilder::new(transport)
    }

    /// Connect to a device over WebSocket with default hooks, sink and codec.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] for an unusable config, or the
    /// transport's error if the connection cannot be established.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        // ---
        let frame_logging = config.frame_logging;
        let transport = crate::create_websocket_transport(config)?;
        Self::builder(transport)
            .frame_logging(frame_logging)
            .build()
            .await
    }

    /// Issue a command and hand its reply to `responder`.
    ///
    /// Returns as soon as the command is queued on the link. The responder
    /// runs on the inbound task when the matching reply arrives.
    ///
    /// # Errors
    ///
    /// - `RpcError::Serialization` / `RpcError::AltEncoding` if `payload`
    ///   cannot be encoded
    /// - `RpcError::ConnectionClosed` if the link is gone; nothing stays
    ///   registered in that case
    pub fn send_command<P, R>(
        &self,
        iface: &str,
        method: &str,
        payload: &P,
        responder: R,
    ) -> Result<SeqId>
    where
        P: Serialize + ?Sized,
        R: Responder,
    {
        // ---
        self.issue(iface, method, payload, Box::new(responder))
    }

    /// Issue a command whose reply the calling thread will block on.
    ///
    /// The returned [`SyncCall`] must be waited on by this same thread.
    pub fn begin_call<P>(&self, iface: &str, method: &str, payload: &P) -> Result<SyncCall>
    where
        P: Serialize + ?Sized,
    {
        // ---
        let (tx, rx) = oneshot::channel();
        let seq_id = self.issue(
            iface,
            method,
            payload,
            Box::new(CompletionResponder::new(tx)),
        )?;

        Ok(SyncCall::new(
            seq_id,
            rx,
            self.inner.registry.clone(),
            self.inner.runtime.clone(),
        ))
    }

    /// Issue a command and block until it is acknowledged; the reply body is
    /// discarded.
    ///
    /// Blocks indefinitely if no reply ever arrives.
    pub fn send_command_sync<P>(&self, iface: &str, method: &str, payload: &P) -> Result<()>
    where
        P: Serialize + ?Sized,
    {
        // ---
        self.blocking_reply(iface, method, payload).map(|_| ())
    }

    /// Issue a command and block for the structured reply value.
    ///
    /// Blocks indefinitely if no reply ever arrives.
    pub fn send_command_value_sync<P>(&self, iface: &str, method: &str, payload: &P) -> Result<Value>
    where
        P: Serialize + ?Sized,
    {
        // ---
        Ok(self.blocking_reply(iface, method, payload)?.payload.value)
    }

    /// Issue a command and block for the reply's alternate encoding.
    ///
    /// Blocks indefinitely if no reply ever arrives.
    pub fn send_command_alt_sync<P>(&self, iface: &str, method: &str, payload: &P) -> Result<String>
    where
        P: Serialize + ?Sized,
    {
        // ---
        Ok(self.blocking_reply(iface, method, payload)?.payload.alt)
    }

    /// Issue a command and block for the reply value deserialized as `T`.
    pub fn send_command_as_sync<P, T>(&self, iface: &str, method: &str, payload: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        // ---
        self.blocking_reply(iface, method, payload)?
            .payload
            .value_as()
    }

    /// Issue a command and await its reply. No deadline.
    ///
    /// # Errors
    ///
    /// As [`send_command`](Self::send_command), plus
    /// `RpcError::ConnectionClosed` if the pending call is abandoned.
    pub async fn call<P>(&self, iface: &str, method: &str, payload: &P) -> Result<Reply>
    where
        P: Serialize + ?Sized,
    {
        // ---
        let (_, rx) = self.issue_completion(iface, method, payload)?;
        rx.await.map_err(|_| RpcError::ConnectionClosed)
    }

    /// Issue a command and await its reply for at most `timeout`.
    ///
    /// On expiry the pending entry is removed and [`RpcError::Timeout`] is
    /// returned.
    pub async fn call_with_timeout<P>(
        &self,
        iface: &str,
        method: &str,
        payload: &P,
        timeout: Duration,
    ) -> Result<Reply>
    where
        P: Serialize + ?Sized,
    {
        // ---
        let (seq_id, rx) = self.issue_completion(iface, method, payload)?;

        match time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => {
                self.inner.registry.take_and_remove(seq_id);
                crate::log_debug!("seq_id {seq_id} timed out after {timeout:?}");
                Err(RpcError::Timeout)
            }
        }
    }

    /// Await the structured reply value.
    pub async fn call_value<P>(&self, iface: &str, method: &str, payload: &P) -> Result<Value>
    where
        P: Serialize + ?Sized,
    {
        Ok(self.call(iface, method, payload).await?.payload.value)
    }

    /// Await the reply's alternate encoding.
    pub async fn call_alt<P>(&self, iface: &str, method: &str, payload: &P) -> Result<String>
    where
        P: Serialize + ?Sized,
    {
        Ok(self.call(iface, method, payload).await?.payload.alt)
    }

    /// Await the reply value deserialized as `T`.
    pub async fn call_as<P, T>(&self, iface: &str, method: &str, payload: &P) -> Result<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(iface, method, payload).await?.payload.value_as()
    }

    /// Number of commands still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_pending(&self, seq_id: SeqId) -> bool {
        self.inner.registry.contains(seq_id)
    }

    /// Drop every pending responder without delivering to it.
    ///
    /// Blocked and awaiting callers wake with [`RpcError::ConnectionClosed`];
    /// custom responders are simply dropped. Returns how many were abandoned.
    /// The client never does this on its own, not even when the link closes.
    pub fn abandon_pending(&self) -> usize {
        // ---
        let abandoned = self.inner.registry.drain();
        let count = abandoned.len();
        if count > 0 {
            crate::log_info!("abandoned {count} pending call(s)");
        }
        count
    }

    /// Ask the link to close.
    ///
    /// Pending calls are left as they are. The hooks observe the close once
    /// the transport reports it.
    pub fn close(&self) -> Result<()> {
        // ---
        self.inner
            .outbound
            .send(Outbound::Close)
            .map_err(|_| RpcError::ConnectionClosed)
    }

    fn blocking_reply<P>(&self, iface: &str, method: &str, payload: &P) -> Result<Reply>
    where
        P: Serialize + ?Sized,
    {
        // ---
        // Refuse before anything is sent.
        ensure_blocking_allowed()?;
        self.begin_call(iface, method, payload)?.wait()
    }

    fn issue_completion<P>(
        &self,
        iface: &str,
        method: &str,
        payload: &P,
    ) -> Result<(SeqId, oneshot::Receiver<Reply>)>
    where
        P: Serialize + ?Sized,
    {
        // ---
        let (tx, rx) = oneshot::channel();
        let seq_id = self.issue(
            iface,
            method,
            payload,
            Box::new(CompletionResponder::new(tx)),
        )?;
        Ok((seq_id, rx))
    }

    /// Allocate, build, register, send.
    fn issue<P>(
        &self,
        iface: &str,
        method: &str,
        payload: &P,
        responder: BoxedResponder,
    ) -> Result<SeqId>
    where
        P: Serialize + ?Sized,
    {
        // ---
        let payload = Payload::from_serializable(payload)?;
        let seq_id = self.inner.seq.next();
        let env = Envelope::command(seq_id, iface, method, payload);
        let frame = self.inner.codec.encode(&env)?;

        self.inner.registry.register(seq_id, responder);

        if self.inner.outbound.send(Outbound::Frame(frame)).is_err() {
            self.inner.registry.take_and_remove(seq_id);
            crate::log_warn!("{iface}.{method} not sent: link closed");
            return Err(RpcError::ConnectionClosed);
        }

        crate::log_debug!("sent {iface}.{method} (seq_id {seq_id})");
        Ok(seq_id)
    }
}
