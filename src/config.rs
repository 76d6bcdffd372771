//! Connection configuration.
//!
//! This type describes *where* the client connects and *which* certificates
//! it is willing to trust. It contains no protocol logic; transports interpret
//! it into concrete connection settings.

use crate::{Result, RpcError};

/// Well-known port the device listens on for its command socket.
pub const DEFAULT_PORT: u16 = 9016;

/// URL scheme used to reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    /// TLS-protected WebSocket (`wss://`).
    #[default]
    Wss,

    /// Plain WebSocket (`ws://`). Only meaningful for loopback or test peers.
    Ws,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Wss => "wss",
            Scheme::Ws => "ws",
        }
    }
}

/// Server certificate trust decision for `wss://` links.
///
/// There is deliberately no `Default` impl: the caller must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustPolicy {
    /// Verify the server chain against the bundled public CA roots.
    WebPkiRoots,

    /// Accept any server certificate without verification.
    ///
    /// Consumer routers ship self-signed certificates, so this is the
    /// setting for talking to a device on the local network. It provides
    /// no protection against an active attacker on that network.
    AcceptAnyCertificate,
}

/// Transport connection parameters.
///
/// # Example
///
/// ```
/// use amplink_rpc::{ConnectionConfig, TrustPolicy};
///
/// let config = ConnectionConfig::new("192.168.114.1", TrustPolicy::AcceptAnyCertificate)
///     .with_frame_logging(true);
///
/// assert_eq!(config.url(), "wss://192.168.114.1:9016/");
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    // ---
    /// Host name or IP address of the device.
    pub host: String,

    /// TCP port. Default: [`DEFAULT_PORT`].
    pub port: u16,

    /// URL scheme. Default: [`Scheme::Wss`].
    pub scheme: Scheme,

    /// Request path. Default: `/`.
    pub path: String,

    /// Certificate trust decision for TLS links.
    pub trust: TrustPolicy,

    /// Log every raw inbound frame at trace level.
    pub frame_logging: bool,
}

impl ConnectionConfig {
    /// Create a config for `host` with an explicit trust policy.
    pub fn new(host: impl Into<String>, trust: TrustPolicy) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            scheme: Scheme::Wss,
            path: "/".to_string(),
            trust,
            frame_logging: false,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the request path. A missing leading `/` is added.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    pub fn with_frame_logging(mut self, enabled: bool) -> Self {
        self.frame_logging = enabled;
        self
    }

    /// Render the endpoint URL.
    pub fn url(&self) -> String {
        // ---
        format!(
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path
        )
    }

    /// Reject configurations that can never connect.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidConfig`] for an empty host or a zero port.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.host.trim().is_empty() {
            return Err(RpcError::InvalidConfig("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(RpcError::InvalidConfig("port must not be 0".into()));
        }
        Ok(())
    }
}
