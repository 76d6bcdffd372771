use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::codec;
use super::SeqId;
use crate::Result;

/// Direction of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Command,
    Response,

    /// Any other `type` string (events, notifications). Ignored by the client.
    #[serde(other)]
    Other,
}

/// Payload carried by an envelope.
///
/// Both representations travel together: `value` is the structured JSON
/// document and `alt` is the base64 text of its MessagePack encoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    // ---
    #[serde(default)]
    pub value: Value,

    #[serde(default, alias = "msgpack")]
    pub alt: String,
}

impl Payload {
    // ---
    /// Build a payload from a structured value, computing `alt` from it.
    pub fn from_value(value: Value) -> Result<Self> {
        // ---
        let alt = codec::encode_alt(&value)?;
        Ok(Self { value, alt })
    }

    /// Serialize `data` and build a payload from it.
    pub fn from_serializable<T: Serialize + ?Sized>(data: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(data)?)
    }

    /// Deserialize the structured value into `T`.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }

    /// Raw MessagePack bytes behind `alt`.
    pub fn alt_bytes(&self) -> Result<Vec<u8>> {
        codec::alt_bytes(&self.alt)
    }

    /// Deserialize the alternate representation into `T`.
    pub fn decode_alt<T: DeserializeOwned>(&self) -> Result<T> {
        codec::decode_alt(&self.alt)
    }
}

/// The top-level wire message.
///
/// ```
/// use amplink_rpc::{Envelope, MessageKind, SeqId};
///
/// let env: Envelope = serde_json::from_str(
///     r#"{"type":"response","seqId":1,"iface":"x","method":"y","payload":{"value":{"ok":true},"alt":""}}"#,
/// ).unwrap();
///
/// assert_eq!(env.kind, MessageKind::Response);
/// assert_eq!(env.seq_id, SeqId::new(1));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    // ---
    #[serde(rename = "type")]
    pub kind: MessageKind,

    pub seq_id: SeqId,

    #[serde(default)]
    pub iface: String,

    #[serde(default)]
    pub method: String,

    #[serde(default)]
    pub payload: Payload,
}

impl Envelope {
    // ---
    /// Create an outbound command envelope.
    pub fn command(
        seq_id: SeqId,
        iface: impl Into<String>,
        method: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            kind: MessageKind::Command,
            seq_id,
            iface: iface.into(),
            method: method.into(),
            payload,
        }
    }

    /// Create a response envelope, as the remote end would send it.
    pub fn response(
        seq_id: SeqId,
        iface: impl Into<String>,
        method: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            kind: MessageKind::Response,
            seq_id,
            iface: iface.into(),
            method: method.into(),
            payload,
        }
    }

    pub fn is_response(&self) -> bool {
        self.kind == MessageKind::Response
    }

    /// Split a response into what its responder receives.
    pub fn into_reply(self) -> Reply {
        Reply {
            iface: self.iface,
            method: self.method,
            payload: self.payload,
        }
    }
}

/// What a responder receives when its reply arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub iface: String,
    pub method: String,
    pub payload: Payload,
}
