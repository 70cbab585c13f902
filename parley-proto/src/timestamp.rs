//! Serde adapter for message timestamps.
//!
//! The server may stamp messages either as RFC 3339 (with offset) or as a
//! naive ISO-8601 local time such as `2024-05-01T10:20:30.123456`. Naive
//! values are taken as UTC. Serialization always emits RFC 3339.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Parses a wire timestamp in either accepted form.
///
/// # Errors
///
/// Returns the underlying [`chrono::ParseError`] if the text matches
/// neither RFC 3339 nor a naive ISO-8601 date-time.
pub fn parse(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(text) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => text.parse::<NaiveDateTime>().map(|naive| naive.and_utc()),
    }
}

/// Formats a timestamp for the wire.
#[must_use]
pub fn format(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Serializes a timestamp as RFC 3339.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S: Serializer>(timestamp: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format(timestamp))
}

/// Deserializes a timestamp in either accepted form.
///
/// # Errors
///
/// Returns a custom deserializer error if the string cannot be parsed.
pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let text = String::deserialize(d)?;
    parse(&text).map_err(|e| serde::de::Error::custom(format!("invalid timestamp {text:?}: {e}")))
}
