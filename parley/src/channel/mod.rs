//! Live channel abstraction for Parley.
//!
//! A [`Connector`] opens a [`Channel`]: a bidirectional text-frame pipe to
//! the chat server. The session owns at most one channel at a time and
//! opens a fresh one on every reconnect.
//! Concrete implementations include:
//! - [`websocket::WebSocketConnector`]: WebSocket client over `tokio-tungstenite`
//! - [`loopback::LoopbackConnector`]: in-process channels for testing

pub mod loopback;
pub mod websocket;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Default capacity of a channel's inbound event queue.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Something that happened on an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One text frame from the server.
    Frame(String),
    /// A frame arrived that cannot be read as text.
    Undecodable(String),
    /// The transport failed; the channel is unusable.
    Failed(String),
    /// The channel closed, cleanly or because the peer went away.
    Closed,
}

/// Errors that can occur while opening or writing to a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel has been closed.
    #[error("channel closed")]
    ConnectionClosed,

    /// Opening the channel took longer than the configured timeout.
    #[error("channel open timed out")]
    Timeout,

    /// The server refused or could not be reached.
    #[error("server {0} is unreachable")]
    Unreachable(String),

    /// The server answered the upgrade with an HTTP error.
    #[error("server rejected upgrade: status {0}")]
    Rejected(u16),

    /// An underlying I/O or protocol error occurred.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write half of a channel, shared with the session so `submit` can hand a
/// frame off without waiting.
#[derive(Debug, Clone)]
pub struct ChannelSender(mpsc::UnboundedSender<String>);

impl ChannelSender {
    /// Queue a text frame for writing.
    ///
    /// Returns as soon as the frame is queued. This is a local hand-off only,
    /// not confirmation that the server received anything.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ConnectionClosed`] if the writer has gone away.
    pub fn send(&self, frame: String) -> Result<(), ChannelError> {
        self.0.send(frame).map_err(|_| ChannelError::ConnectionClosed)
    }
}

/// An open live channel.
///
/// Dropping the channel closes it: the writer sees its queue end and sends
/// a close frame, and any background reader is aborted.
pub struct Channel {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::Receiver<ChannelEvent>,
    reader: Option<JoinHandle<()>>,
}

impl Channel {
    /// Assemble a channel from its queues.
    ///
    /// `reader` is a background task feeding `inbound`; it is aborted when
    /// the channel is dropped.
    #[must_use]
    pub const fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::Receiver<ChannelEvent>,
        reader: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            reader,
        }
    }

    /// Return a handle for writing frames.
    #[must_use]
    pub fn sender(&self) -> ChannelSender {
        ChannelSender(self.outbound.clone())
    }

    /// Wait for the next event.
    ///
    /// Yields [`ChannelEvent::Closed`] once every producer has gone away.
    pub async fn next_event(&mut self) -> ChannelEvent {
        self.inbound.recv().await.unwrap_or(ChannelEvent::Closed)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Opens live channels to the chat server.
///
/// The session calls [`Connector::open`] once per connection attempt and
/// never holds more than one channel at a time.
pub trait Connector: Send + Sync + 'static {
    /// Open a new channel.
    ///
    /// Returns when the channel is ready to carry frames, or with the reason
    /// the attempt failed.
    fn open(&self) -> impl std::future::Future<Output = Result<Channel, ChannelError>> + Send;
}
