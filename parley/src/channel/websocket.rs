//! WebSocket channel for Parley.
//!
//! Opens the live channel as a WebSocket text connection to the chat server.
//! Each open spawns a reader task that turns incoming frames into
//! [`ChannelEvent`]s and a writer task that drains the outbound queue.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{Channel, ChannelError, ChannelEvent, Connector, DEFAULT_EVENT_BUFFER};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for opening the WebSocket.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket channels to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector for the given `ws://` or `wss://` URL.
    #[must_use]
    pub const fn new(url: Url, connect_timeout: Duration) -> Self {
        Self {
            url,
            connect_timeout,
        }
    }

    /// Return the URL this connector opens.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl Connector for WebSocketConnector {
    /// Open the WebSocket and spawn its reader and writer tasks.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Timeout`] if the handshake does not finish in time.
    /// - [`ChannelError::Unreachable`] if the connection is refused.
    /// - [`ChannelError::Rejected`] if the server answers with an HTTP error.
    /// - [`ChannelError::Io`] for TLS and other transport failures.
    async fn open(&self) -> Result<Channel, ChannelError> {
        let url = self.url.as_str();
        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(url))
                .await
                .map_err(|_| {
                    tracing::warn!(url, "WebSocket connect timed out");
                    ChannelError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url, err = %e, "WebSocket connect failed");
                    map_ws_connect_error(e, url)
                })?;

        tracing::info!(url, "WebSocket channel open");

        let (ws_sender, ws_reader) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::channel(DEFAULT_EVENT_BUFFER);
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(reader_loop(ws_reader, event_tx.clone()));
        tokio::spawn(writer_loop(ws_sender, out_rx, event_tx));

        Ok(Channel::new(out_tx, event_rx, Some(reader)))
    }
}

/// Background task that reads WebSocket frames and forwards them as events.
///
/// Text frames are forwarded verbatim; the session does the parsing.
/// Binary frames that are not UTF-8 are reported as undecodable. The task
/// ends after reporting a close or a read error.
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<ChannelEvent>) {
    while let Some(msg_result) = ws_reader.next().await {
        let event = match msg_result {
            Ok(Message::Text(text)) => ChannelEvent::Frame(text.to_string()),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => ChannelEvent::Frame(text),
                Err(_) => ChannelEvent::Undecodable(format!("{}-byte binary frame", data.len())),
            },
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "WebSocket closed by server");
                let _ = tx.send(ChannelEvent::Closed).await;
                return;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                let _ = tx.send(ChannelEvent::Failed(e.to_string())).await;
                return;
            }
        };
        if tx.send(event).await.is_err() {
            // Channel dropped, nobody is listening.
            return;
        }
    }
    tracing::info!("WebSocket stream ended");
    let _ = tx.send(ChannelEvent::Closed).await;
}

/// Background task that writes queued frames to the WebSocket.
///
/// When every [`super::ChannelSender`] and the owning [`Channel`] are gone
/// the queue ends and a close frame is sent.
async fn writer_loop(
    mut ws_sender: WsSender,
    mut rx: mpsc::UnboundedReceiver<String>,
    events: mpsc::Sender<ChannelEvent>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = ws_sender.send(Message::Text(frame.into())).await {
            tracing::warn!(err = %e, "WebSocket send failed");
            let _ = events.send(ChannelEvent::Failed(e.to_string())).await;
            return;
        }
    }
    if let Err(e) = ws_sender.close().await {
        tracing::debug!(err = %e, "WebSocket close handshake failed");
    }
    tracing::debug!("WebSocket writer exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`ChannelError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error, url: &str) -> ChannelError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                ChannelError::Unreachable(url.to_string())
            } else {
                ChannelError::Io(io_err)
            }
        }
        WsError::Tls(_) => ChannelError::Io(std::io::Error::other(format!("TLS error: {err}"))),
        WsError::Http(response) => ChannelError::Rejected(response.status().as_u16()),
        other => ChannelError::Io(std::io::Error::other(format!(
            "WebSocket connection error: {other}"
        ))),
    }
}
