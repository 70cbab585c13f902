//! Loopback channel for testing.
//!
//! Uses in-process [`tokio::sync::mpsc`] channels in place of a network
//! connection. [`LoopbackConnector::create`] returns the connector handed to
//! a session plus a [`LoopbackServer`] through which a test decides the
//! outcome of every open attempt and plays the server side of each channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, oneshot};

use super::{Channel, ChannelError, ChannelEvent, Connector, DEFAULT_EVENT_BUFFER};

/// Connector whose open attempts are resolved by a [`LoopbackServer`].
pub struct LoopbackConnector {
    attempts: mpsc::UnboundedSender<PendingOpen>,
    count: Arc<AtomicUsize>,
}

/// Test-side handle that observes and resolves open attempts.
pub struct LoopbackServer {
    attempts: mpsc::UnboundedReceiver<PendingOpen>,
    count: Arc<AtomicUsize>,
}

/// An open attempt waiting for the test to accept or reject it.
pub struct PendingOpen {
    reply: oneshot::Sender<Result<Channel, ChannelError>>,
}

/// Server side of an accepted loopback channel.
pub struct LoopbackPeer {
    to_client: mpsc::Sender<ChannelEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl LoopbackConnector {
    /// Create a connected connector/server pair.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use parley::channel::Connector;
    /// use parley::channel::loopback::LoopbackConnector;
    ///
    /// # async fn example() {
    /// let (connector, mut server) = LoopbackConnector::create();
    /// let open = tokio::spawn(async move { connector.open().await });
    /// let peer = server.next_attempt().await.unwrap().accept();
    /// let channel = open.await.unwrap().unwrap();
    /// # drop((peer, channel));
    /// # }
    /// ```
    #[must_use]
    pub fn create() -> (Self, LoopbackServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let count = Arc::new(AtomicUsize::new(0));
        (
            Self {
                attempts: tx,
                count: Arc::clone(&count),
            },
            LoopbackServer {
                attempts: rx,
                count,
            },
        )
    }
}

impl Connector for LoopbackConnector {
    async fn open(&self) -> Result<Channel, ChannelError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.attempts
            .send(PendingOpen { reply: reply_tx })
            .map_err(|_| ChannelError::Unreachable("loopback".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ChannelError::Unreachable("loopback".to_string()))?
    }
}

impl LoopbackServer {
    /// Wait for the next open attempt.
    ///
    /// Returns `None` once the connector has been dropped.
    pub async fn next_attempt(&mut self) -> Option<PendingOpen> {
        self.attempts.recv().await
    }

    /// Return an attempt that has already been made, if any.
    pub fn try_next_attempt(&mut self) -> Option<PendingOpen> {
        self.attempts.try_recv().ok()
    }

    /// Total number of open attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl PendingOpen {
    /// Complete the attempt with an open channel.
    #[must_use]
    pub fn accept(self) -> LoopbackPeer {
        let (event_tx, event_rx) = mpsc::channel(DEFAULT_EVENT_BUFFER);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let _ = self.reply.send(Ok(Channel::new(out_tx, event_rx, None)));
        LoopbackPeer {
            to_client: event_tx,
            from_client: out_rx,
        }
    }

    /// Fail the attempt.
    pub fn reject(self, err: ChannelError) {
        let _ = self.reply.send(Err(err));
    }
}

impl LoopbackPeer {
    /// Deliver a text frame to the client.
    pub async fn send_frame(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(ChannelEvent::Frame(frame.into())).await;
    }

    /// Deliver an arbitrary event to the client.
    pub async fn send_event(&self, event: ChannelEvent) {
        let _ = self.to_client.send(event).await;
    }

    /// Close the channel from the server side.
    pub async fn close(self) {
        let _ = self.to_client.send(ChannelEvent::Closed).await;
    }

    /// Fail the channel with a transport error.
    pub async fn fail(self, reason: &str) {
        let _ = self
            .to_client
            .send(ChannelEvent::Failed(reason.to_string()))
            .await;
    }

    /// Wait for the next frame written by the client.
    ///
    /// Returns `None` once the client has dropped its channel.
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Return a frame the client has already written, if any.
    pub fn try_recv_frame(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}
