//! Chat session: the connection and message-state core.
//!
//! A [`ChatSession`] seeds its message sequence from a [`HistorySource`],
//! then keeps one live [`Channel`](crate::channel::Channel) open through a
//! [`Connector`], reconnecting after a fixed delay whenever it closes. All
//! channel events and timers are handled by a single driver task; callers
//! read snapshots, subscribe to [`SessionEvent`]s, and call
//! [`ChatSession::submit`].

mod state;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use parley_proto::codec::CodecError;
use parley_proto::message::Message;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::channel::{Channel, ChannelEvent, Connector};
use crate::history::{HistorySource, load_history};
use state::SessionState;

/// Default pause between a channel closing and the next open attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connection state of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Category of a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The history fetch failed; the session started with no history.
    HistoryLoadFailed,
    /// The live channel failed to open or broke while open.
    ChannelError,
    /// An inbound frame was not a valid message and was dropped.
    MalformedMessage,
    /// A submit was attempted without an open channel.
    NotConnected,
    /// A submit was attempted with a blank user name.
    ValidationFailed,
}

/// The most recent failure, shown to the user until replaced or cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSignal {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorSignal {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// A change to session state, delivered to subscribers in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// History was installed; carries the whole sequence afterwards.
    Seeded(Vec<Message>),
    /// A live message was appended.
    MessageAppended(Message),
    StateChanged(ConnectionState),
    /// The last error was replaced (`Some`) or cleared (`None`).
    ErrorChanged(Option<ErrorSignal>),
}

/// Point-in-time copy of everything an observer can read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub state: ConnectionState,
    pub last_error: Option<ErrorSignal>,
}

/// A snapshot plus the stream of every change made after it.
#[derive(Debug)]
pub struct Subscription {
    pub snapshot: SessionSnapshot,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Subscription {
    /// Wait for the next change.
    ///
    /// Returns `None` once the session has been torn down.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }
}

/// Successful outcome of [`ChatSession::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// The frame was handed to the channel.
    Sent,
    /// The content was blank; nothing happened.
    Ignored,
}

/// Why a submit was rejected.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("a user name is required")]
    ValidationFailed,

    #[error("not connected to server")]
    NotConnected,

    #[error("failed to encode message: {0}")]
    Encode(#[from] CodecError),
}

/// Tunables for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Pause between a closure and the next open attempt. Never grows.
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// A running chat session.
///
/// Dropping the session tears it down: the channel is closed, any pending
/// reconnect is cancelled and subscribers see their streams end.
pub struct ChatSession {
    shared: Arc<Mutex<SessionState>>,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Start a session and its driver task.
    ///
    /// The driver fetches history once, seeds the sequence, then opens the
    /// live channel. Must be called from within a Tokio runtime.
    pub fn start<H, C>(history: H, connector: C, config: SessionConfig) -> Self
    where
        H: HistorySource,
        C: Connector,
    {
        let shared = Arc::new(Mutex::new(SessionState::default()));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let driver = tokio::spawn(drive(
            Arc::clone(&shared),
            history,
            connector,
            config,
            shutdown_rx,
        ));
        Self {
            shared,
            shutdown: Some(shutdown_tx),
            driver: Some(driver),
        }
    }

    /// Subscribe to changes.
    ///
    /// The snapshot and the stream are taken atomically, so no change is
    /// missed or seen twice.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (snapshot, events) = self.shared.lock().subscribe();
        Subscription { snapshot, events }
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }

    /// Current message sequence, oldest-first.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.shared.lock().messages().to_vec()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().connection()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<ErrorSignal> {
        self.shared.lock().last_error().cloned()
    }

    /// Send a message over the live channel.
    ///
    /// The user name is checked first, then the content: blank content is
    /// ignored without touching any state. The message is not added to the
    /// sequence here; it arrives with the server's echo.
    ///
    /// # Errors
    ///
    /// - [`SubmitError::ValidationFailed`] if `user_name` is blank.
    /// - [`SubmitError::NotConnected`] if the session is not `Connected`.
    /// - [`SubmitError::Encode`] if the frame cannot be serialized.
    pub fn submit(&self, user_name: &str, content: &str) -> Result<Submitted, SubmitError> {
        self.shared.lock().submit(user_name, content)
    }

    /// Tear the session down and wait for the driver to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                tracing::warn!(err = %e, "session driver ended abnormally");
            }
        }
        self.shared.lock().tear_down();
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.shared.lock().tear_down();
    }
}

/// Driver task: runs the session until told to stop.
async fn drive<H, C>(
    shared: Arc<Mutex<SessionState>>,
    history: H,
    connector: C,
    config: SessionConfig,
    mut shutdown: oneshot::Receiver<()>,
) where
    H: HistorySource,
    C: Connector,
{
    tokio::select! {
        biased;
        _ = &mut shutdown => {
            tracing::info!("session shutting down");
        }
        () = run(&shared, &history, &connector, &config) => {}
    }
    shared.lock().tear_down();
}

/// Seed from history, then keep the channel open forever.
async fn run<H, C>(shared: &Mutex<SessionState>, history: &H, connector: &C, config: &SessionConfig)
where
    H: HistorySource,
    C: Connector,
{
    let batch = load_history(history).await;
    {
        let mut state = shared.lock();
        state.seed(batch.messages);
        if let Some(err) = batch.error {
            state.record_error(err);
        }
    }

    loop {
        if !shared.lock().begin_connect() {
            return;
        }

        match connector.open().await {
            Ok(channel) => serve(shared, channel).await,
            Err(e) => {
                tracing::warn!(err = %e, "channel open failed");
                let mut state = shared.lock();
                state.record_error(ErrorSignal::new(ErrorKind::ChannelError, e.to_string()));
                state.disconnected();
            }
        }

        tracing::info!(delay = ?config.reconnect_delay, "reconnect scheduled");
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

/// Process events on an open channel until it closes.
async fn serve(shared: &Mutex<SessionState>, mut channel: Channel) {
    tracing::info!("channel connected");
    shared.lock().connected(channel.sender());

    loop {
        match channel.next_event().await {
            ChannelEvent::Frame(text) => shared.lock().ingest_frame(&text),
            ChannelEvent::Undecodable(what) => {
                tracing::warn!(frame = %what, "dropping undecodable frame");
                shared.lock().record_error(ErrorSignal::new(
                    ErrorKind::MalformedMessage,
                    format!("undecodable frame: {what}"),
                ));
            }
            ChannelEvent::Failed(reason) => {
                tracing::warn!(err = %reason, "channel failed");
                shared
                    .lock()
                    .record_error(ErrorSignal::new(ErrorKind::ChannelError, reason));
                break;
            }
            ChannelEvent::Closed => {
                tracing::info!("channel closed");
                break;
            }
        }
    }

    // Drop the sender before the channel so the writer sees its queue end.
    shared.lock().disconnected();
    drop(channel);
}
