//! Wire format message types for the Parley protocol.
//!
//! Field names follow the server's JSON convention (`userName`, `content`,
//! `timestamp`). Messages carry no identifier, so nothing at this layer can
//! detect a duplicate delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as stored by the server and delivered to clients.
///
/// Immutable once created. Produced either by the history endpoint or by an
/// inbound channel frame; the timestamp is always assigned server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Display name of the author.
    pub user_name: String,
    /// Message body.
    pub content: String,
    /// When the server accepted the message.
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message with an explicit timestamp.
    #[must_use]
    pub fn new(
        user_name: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            content: content.into(),
            timestamp,
        }
    }

    /// Checks the non-empty invariants on both text fields.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyUserName`] or
    /// [`ValidationError::EmptyContent`] when the field is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user_name.is_empty() {
            return Err(ValidationError::EmptyUserName);
        }
        if self.content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        Ok(())
    }
}

/// A message as submitted by a client. The server stamps the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// Message body.
    pub content: String,
    /// Display name of the author.
    pub user_name: String,
}

impl OutboundMessage {
    /// Creates an outbound message.
    #[must_use]
    pub fn new(user_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            user_name: user_name.into(),
        }
    }

    /// Turns a submitted message into a stored one at the given instant.
    #[must_use]
    pub fn stamp(self, timestamp: DateTime<Utc>) -> Message {
        Message {
            user_name: self.user_name,
            content: self.content,
            timestamp,
        }
    }
}

/// Body of the history endpoint.
///
/// On success `messages` is populated, newest-first. On a server-side
/// failure the body carries `error` instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Stored messages, newest-first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    /// Server-reported failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error returned when a message violates a field invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// `userName` is empty.
    #[error("message user name is empty")]
    EmptyUserName,
    /// `content` is empty.
    #[error("message content is empty")]
    EmptyContent,
}

/// Returns `true` when `text` is empty or whitespace only.
#[must_use]
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
