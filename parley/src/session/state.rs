//! Session state and its event handlers.
//!
//! [`SessionState`] is the single owner of the message sequence, connection
//! state and last error. Every mutation goes through one of its handlers,
//! each of which notifies subscribers in the order the changes happen.
//! Once torn down, the state ignores every further mutation.

use parley_proto::codec;
use parley_proto::message::{Message, OutboundMessage, is_blank};
use tokio::sync::mpsc;

use super::{
    ConnectionState, ErrorKind, ErrorSignal, SessionEvent, SessionSnapshot, SubmitError, Submitted,
};
use crate::channel::{ChannelError, ChannelSender};

/// Shown when a submit is attempted with a blank user name.
const USER_NAME_REQUIRED: &str = "Please enter a username";

/// Shown when a submit is attempted without an open channel.
const NOT_CONNECTED: &str = "Not connected to server";

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    messages: Vec<Message>,
    connection: ConnectionState,
    last_error: Option<ErrorSignal>,
    outbound: Option<ChannelSender>,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
    torn_down: bool,
}

impl SessionState {
    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            messages: self.messages.clone(),
            state: self.connection,
            last_error: self.last_error.clone(),
        }
    }

    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) const fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub(crate) const fn last_error(&self) -> Option<&ErrorSignal> {
        self.last_error.as_ref()
    }

    /// Register a subscriber and return the state it starts from.
    pub(crate) fn subscribe(
        &mut self,
    ) -> (SessionSnapshot, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.torn_down {
            self.subscribers.push(tx);
        }
        (self.snapshot(), rx)
    }

    /// Install the history batch as the start of the sequence.
    ///
    /// Anything already in the sequence stays after the history.
    pub(crate) fn seed(&mut self, history: Vec<Message>) {
        if self.torn_down {
            return;
        }
        let live = std::mem::replace(&mut self.messages, history);
        self.messages.extend(live);
        self.emit(SessionEvent::Seeded(self.messages.clone()));
    }

    /// Move to `Connecting` for a new open attempt.
    ///
    /// Returns `false` once torn down; no attempt may start after that.
    pub(crate) fn begin_connect(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.set_connection(ConnectionState::Connecting);
        true
    }

    /// The channel opened: keep its sender and clear the last error.
    pub(crate) fn connected(&mut self, sender: ChannelSender) {
        if self.torn_down {
            return;
        }
        self.outbound = Some(sender);
        self.set_connection(ConnectionState::Connected);
        self.clear_error();
    }

    /// The channel is gone: drop its sender so the writer can finish.
    pub(crate) fn disconnected(&mut self) {
        self.outbound = None;
        self.set_connection(ConnectionState::Disconnected);
    }

    /// Parse one inbound frame and append it, or surface why it was dropped.
    pub(crate) fn ingest_frame(&mut self, frame: &str) {
        if self.torn_down {
            return;
        }
        match codec::decode_message(frame) {
            Ok(msg) => {
                tracing::debug!(user = %msg.user_name, "message received");
                self.messages.push(msg.clone());
                self.emit(SessionEvent::MessageAppended(msg));
            }
            Err(e) => {
                tracing::warn!(err = %e, "dropping malformed frame");
                self.record_error(ErrorSignal::new(ErrorKind::MalformedMessage, e.to_string()));
            }
        }
    }

    pub(crate) fn record_error(&mut self, signal: ErrorSignal) {
        if self.torn_down {
            return;
        }
        self.last_error = Some(signal.clone());
        self.emit(SessionEvent::ErrorChanged(Some(signal)));
    }

    fn clear_error(&mut self) {
        if self.last_error.take().is_some() {
            self.emit(SessionEvent::ErrorChanged(None));
        }
    }

    /// Validate a submission and hand it to the open channel.
    ///
    /// Nothing is appended locally; the message appears once the server
    /// echoes it back.
    pub(crate) fn submit(
        &mut self,
        user_name: &str,
        content: &str,
    ) -> Result<Submitted, SubmitError> {
        if is_blank(user_name) {
            self.record_error(ErrorSignal::new(
                ErrorKind::ValidationFailed,
                USER_NAME_REQUIRED,
            ));
            return Err(SubmitError::ValidationFailed);
        }
        if is_blank(content) {
            return Ok(Submitted::Ignored);
        }

        if self.connection != ConnectionState::Connected {
            return Err(self.reject_not_connected());
        }

        let frame = codec::encode_outbound(&OutboundMessage::new(user_name, content))?;
        let sent = match &self.outbound {
            Some(sender) => sender.send(frame),
            None => Err(ChannelError::ConnectionClosed),
        };
        if let Err(e) = sent {
            tracing::warn!(err = %e, "channel writer gone during submit");
            return Err(self.reject_not_connected());
        }
        Ok(Submitted::Sent)
    }

    fn reject_not_connected(&mut self) -> SubmitError {
        self.record_error(ErrorSignal::new(ErrorKind::NotConnected, NOT_CONNECTED));
        SubmitError::NotConnected
    }

    /// Final transition: disconnect, notify, and refuse all later changes.
    pub(crate) fn tear_down(&mut self) {
        if self.torn_down {
            return;
        }
        self.disconnected();
        self.torn_down = true;
        self.subscribers.clear();
    }

    fn set_connection(&mut self, next: ConnectionState) {
        if self.torn_down || self.connection == next {
            return;
        }
        tracing::debug!(from = ?self.connection, to = ?next, "connection state");
        self.connection = next;
        self.emit(SessionEvent::StateChanged(next));
    }

    fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
