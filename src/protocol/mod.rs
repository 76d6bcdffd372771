/// Protocol types for command/response correlation and serialization
///
/// This module defines the wire envelope, the sequence ids that correlate
/// commands with replies, and the codec that turns envelopes into frames.
pub mod codec;
mod envelope;
mod seq;

pub use codec::{EnvelopeCodec, JsonCodec};
pub use envelope::{Envelope, MessageKind, Payload, Reply};
pub use seq::{SeqAllocator, SeqId};
