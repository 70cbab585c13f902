//! JSON encoding and decoding for Parley frames and history bodies.
//!
//! Each live-channel frame carries exactly one JSON object; the channel's
//! own message boundaries delimit frames, so there is no length prefix.
//! Every decoded [`Message`] is validated before it is returned.

use crate::message::{HistoryResponse, Message, OutboundMessage, ValidationError};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The payload parsed but violates a message invariant.
    #[error("invalid message: {0}")]
    Invalid(#[from] ValidationError),
    /// The history body reported a server-side failure.
    #[error("server reported error: {0}")]
    Server(String),
    /// The history body had neither `messages` nor `error`.
    #[error("history body has no messages field")]
    MissingMessages,
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Encodes an outbound submission as a text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode_outbound(msg: &OutboundMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes an outbound submission received by a server.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame is not a valid
/// `{content, userName}` object.
pub fn decode_outbound(frame: &str) -> Result<OutboundMessage, CodecError> {
    Ok(serde_json::from_str(frame)?)
}

/// Encodes a stored message as an inbound text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode_message(msg: &Message) -> Result<String, CodecError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decodes one inbound text frame into a validated [`Message`].
///
/// # Errors
///
/// Returns `CodecError::Serialization` for malformed JSON, missing fields or
/// an unparseable timestamp, and `CodecError::Invalid` for empty fields.
pub fn decode_message(frame: &str) -> Result<Message, CodecError> {
    let msg: Message = serde_json::from_str(frame)?;
    msg.validate()?;
    Ok(msg)
}

/// Encodes a history body from messages already ordered newest-first.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the body cannot be serialized.
pub fn encode_history(newest_first: Vec<Message>) -> Result<String, CodecError> {
    let body = HistoryResponse {
        messages: Some(newest_first),
        error: None,
    };
    Ok(serde_json::to_string(&body)?)
}

/// Decodes a history body and returns its messages oldest-first.
///
/// The server lists history newest-first; the order is reversed here so the
/// result can seed a sequence that then grows by appending.
///
/// # Errors
///
/// Returns `CodecError::Server` if the body carries an `error` field,
/// `CodecError::MissingMessages` if it carries neither field,
/// `CodecError::Serialization` for malformed JSON, and
/// `CodecError::Invalid` if any entry has an empty field.
pub fn decode_history(body: &[u8]) -> Result<Vec<Message>, CodecError> {
    let response: HistoryResponse = serde_json::from_slice(body)?;
    history_oldest_first(response)
}

/// Converts an already-parsed history body into oldest-first order.
///
/// # Errors
///
/// Same conditions as [`decode_history`], minus JSON syntax errors.
pub fn history_oldest_first(response: HistoryResponse) -> Result<Vec<Message>, CodecError> {
    if let Some(reason) = response.error {
        return Err(CodecError::Server(reason));
    }
    let mut messages = response.messages.ok_or(CodecError::MissingMessages)?;
    for msg in &messages {
        msg.validate()?;
    }
    messages.reverse();
    Ok(messages)
}
