//! Concrete links and the loop that drains them.
//!
//! Each transport is reachable only through its `create_*` function, which
//! hands back a [`TransportPtr`](crate::TransportPtr).

mod memory;
pub(crate) mod runner;
pub mod tls;
mod websocket;

pub use memory::{create_memory_transport, MemoryPeer};
pub use websocket::create_websocket_transport;
