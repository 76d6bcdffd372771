// src/error.rs

use std::thread::ThreadId;

use thiserror::Error;

/// Errors that can occur while issuing commands or running the connection.
#[derive(Error, Debug)]
pub enum RpcError {
    // ---
    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The alternate (MessagePack/base64) representation could not be
    /// produced or read back.
    #[error("alternate encoding error: {0}")]
    AltEncoding(String),

    /// The underlying duplex link failed to open or broke while in use.
    #[error("transport error: {0}")]
    Transport(String),

    /// TLS client configuration could not be built.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The link is gone, or the pending call was abandoned before a reply arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// An optional deadline expired before the reply arrived.
    #[error("request timed out")]
    Timeout,

    /// A blocking wait was attempted on a thread other than the one that
    /// issued the call.
    #[error("wait called from the wrong thread (issued on {expected:?}, waited on {actual:?})")]
    WrongContext { expected: ThreadId, actual: ThreadId },

    /// A blocking wait was attempted inside a current-thread runtime.
    #[error("blocking wait called within a current-thread runtime; use the async call surface")]
    BlockingInAsyncContext,

    /// A caller-supplied responder reported a failure while handling its reply.
    #[error("responder failed: {0}")]
    Responder(String),

    /// Connection configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<rmp_serde::encode::Error> for RpcError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        // ---
        RpcError::AltEncoding(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RpcError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        // ---
        RpcError::AltEncoding(err.to_string())
    }
}

impl From<base64::DecodeError> for RpcError {
    fn from(err: base64::DecodeError) -> Self {
        // ---
        RpcError::AltEncoding(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RpcError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        // ---
        RpcError::Transport(err.to_string())
    }
}

impl From<rustls::Error> for RpcError {
    fn from(err: rustls::Error) -> Self {
        // ---
        RpcError::Tls(err.to_string())
    }
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;
