//! Link abstractions shared by the client and the transports.
//!
//! Nothing in here knows about WebSockets, TLS or the envelope format.
//! Import these names through this module rather than `domain::transport`.

mod transport;

pub use transport::{
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
