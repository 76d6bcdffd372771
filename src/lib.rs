//! Command/response correlation over a full-duplex message connection
//!
//! This library turns an asynchronous WebSocket link into remote-call
//! primitives. A caller issues a named command (`iface` + `method` +
//! payload) and either blocks until the matching reply arrives, awaits it,
//! or registers a responder that runs when it does. Replies are matched to
//! commands by a per-connection sequence id.
//!

// Import all sub modules once...
mod client;
mod domain;
mod protocol;
mod transport;

mod config;
mod error;
mod macros;

#[cfg(all(test, feature = "logging"))]
mod log_capture;

pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};

// Re-export main types
pub use client::{
    //
    BoxedResponder,
    DispatchFault,
    DispatchOutcome,
    Dispatcher,
    ErrorSink,
    LogErrorSink,
    Responder,
    ResponderRegistry,
    RpcClient,
    RpcClientBuilder,
    SyncCall,
};

pub use config::{ConnectionConfig, Scheme, TrustPolicy, DEFAULT_PORT};
pub use error::{Result, RpcError};

pub use protocol::codec;
pub use protocol::{
    //
    Envelope,
    EnvelopeCodec,
    JsonCodec,
    MessageKind,
    Payload,
    Reply,
    SeqAllocator,
    SeqId,
};

pub use transport::tls;
pub use transport::{create_memory_transport, create_websocket_transport, MemoryPeer};

// --- public re-exports
pub use domain::{
    //
    ConnectionHooks,
    HooksPtr,
    Link,
    LinkEvent,
    NoHooks,
    Outbound,
    Transport,
    TransportPtr,
};
