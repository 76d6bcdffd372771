//! WebSocket transport (tokio-tungstenite).
//!
//! Envelopes travel as text frames, one envelope per frame. Binary frames
//! are accepted when they hold UTF-8 text. Ping/pong is answered by
//! tungstenite itself.
//!
//! `open()` connects, then splits the socket between two tasks:
//!
//! - a writer that drains the link's outbound channel into the socket
//! - a reader that forwards frames and lifecycle events to the inbound channel
//!
//! Dropping every sender of the outbound channel closes the socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};

use super::tls;
use crate::{
    // ---
    ConnectionConfig,
    Link,
    LinkEvent,
    Outbound,
    Result,
    RpcError,
    Scheme,
    Transport,
    TransportPtr,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WebSocketTransport {
    // ---
    config: ConnectionConfig,
}

impl WebSocketTransport {
    fn connector(&self) -> Result<Connector> {
        // ---
        match self.config.scheme {
            Scheme::Ws => Ok(Connector::Plain),
            Scheme::Wss => Ok(Connector::Rustls(Arc::new(tls::client_config(
                self.config.trust,
            )?))),
        }
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    // ---
    fn name(&self) -> &str {
        "websocket"
    }

    async fn open(&self) -> Result<Link> {
        // ---
        let url = self.config.url();
        let connector = self.connector()?;

        crate::log_debug!("connecting to {url}");

        let (stream, _response) =
            tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, false, Some(connector))
                .await?;

        let (sink, stream) = stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let local_close = Arc::new(AtomicBool::new(false));

        tokio::spawn(write_loop(sink, out_rx, in_tx.clone(), local_close.clone()));
        tokio::spawn(read_loop(stream, in_tx, local_close));

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<LinkEvent>,
    local_close: Arc<AtomicBool>,
) {
    // ---
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if let Err(err) = sink.send(WsMessage::text(frame)).await {
                    let _ = events.send(LinkEvent::Error(err.into()));
                    return;
                }
            }
            Outbound::Close => break,
        }
    }

    // Close requested, or every client handle is gone.
    local_close.store(true, Ordering::SeqCst);
    if let Err(_err) = sink.close().await {
        crate::log_debug!("websocket close: {_err}");
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<LinkEvent>,
    local_close: Arc<AtomicBool>,
) {
    // ---
    let closed = loop {
        let event = match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => LinkEvent::Frame(text.as_str().to_owned()),
            Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => LinkEvent::Frame(text.to_owned()),
                Err(_) => LinkEvent::Error(RpcError::Transport(
                    "binary frame is not UTF-8 text".into(),
                )),
            },
            Some(Ok(WsMessage::Close(frame))) => {
                let (code, reason) = match frame {
                    Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_owned()),
                    None => (None, String::new()),
                };
                break LinkEvent::Closed {
                    code,
                    reason,
                    remote: !local_close.load(Ordering::SeqCst),
                };
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                let _ = events.send(LinkEvent::Error(err.into()));
                break LinkEvent::Closed {
                    code: None,
                    reason: String::new(),
                    remote: !local_close.load(Ordering::SeqCst),
                };
            }
            None => {
                break LinkEvent::Closed {
                    code: None,
                    reason: String::new(),
                    remote: !local_close.load(Ordering::SeqCst),
                };
            }
        };

        if events.send(event).is_err() {
            // Inbound loop is gone; nobody is listening.
            return;
        }
    };

    let _ = events.send(closed);
}

/// Create a WebSocket transport for `config`.
///
/// Nothing is connected until the client opens the transport.
///
/// # Errors
///
/// Returns [`RpcError::InvalidConfig`] if the config fails validation.
pub fn create_websocket_transport(config: ConnectionConfig) -> Result<TransportPtr> {
    // ---
    config.validate()?;
    Ok(Arc::new(WebSocketTransport { config }))
}
