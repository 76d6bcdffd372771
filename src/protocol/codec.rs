//! Envelope codec.
//!
//! Frames travel as JSON text. The `alt` field of a payload is the base64
//! text of the MessagePack encoding of `value`, written with
//! `rmp_serde::to_vec_named` so structs become maps rather than arrays.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Envelope;
use crate::Result;

/// Turns envelopes into text frames and back.
///
/// The client ships with [`JsonCodec`]; implement this to speak a variant
/// of the wire format.
pub trait EnvelopeCodec: Send + Sync {
    /// Encode an outbound envelope into a text frame.
    fn encode(&self, env: &Envelope) -> Result<String>;

    /// Decode an inbound text frame.
    fn decode(&self, frame: &str) -> Result<Envelope>;
}

/// JSON text codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl EnvelopeCodec for JsonCodec {
    fn encode(&self, env: &Envelope) -> Result<String> {
        Ok(serde_json::to_string(env)?)
    }

    fn decode(&self, frame: &str) -> Result<Envelope> {
        Ok(serde_json::from_str(frame)?)
    }
}

/// Encode `value` as base64'd MessagePack.
pub fn encode_alt<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    // ---
    let bytes = rmp_serde::to_vec_named(value)?;
    Ok(STANDARD.encode(bytes))
}

/// Base64-decode an `alt` string into raw MessagePack bytes.
pub fn alt_bytes(alt: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(alt)?)
}

/// Decode an `alt` string into `T`.
pub fn decode_alt<T: DeserializeOwned>(alt: &str) -> Result<T> {
    // ---
    let bytes = alt_bytes(alt)?;
    Ok(rmp_serde::from_slice(&bytes)?)
}
