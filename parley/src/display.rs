//! Text rendering for the terminal client.

use chrono::{DateTime, Utc};
use parley_proto::message::Message;

use crate::session::{ConnectionState, ErrorSignal};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// Describe how long ago `ts` was, e.g. "3 minutes ago" or "about 2 hours ago".
///
/// Timestamps slightly in the future (clock skew) read as "in ...".
#[must_use]
pub fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - ts).num_seconds();
    let distance = distance_words(secs.abs());
    if secs < 0 {
        format!("in {distance}")
    } else {
        format!("{distance} ago")
    }
}

fn distance_words(secs: i64) -> String {
    let rounded = |unit: i64| (secs + unit / 2) / unit;
    match secs {
        s if s < 30 => "less than a minute".to_string(),
        s if s < 90 => "1 minute".to_string(),
        s if s < 45 * MINUTE => format!("{} minutes", rounded(MINUTE)),
        s if s < 90 * MINUTE => "about 1 hour".to_string(),
        s if s < DAY => format!("about {} hours", rounded(HOUR)),
        s if s < 42 * HOUR => "1 day".to_string(),
        s if s < MONTH => format!("{} days", rounded(DAY)),
        s if s < 45 * DAY => "about 1 month".to_string(),
        s if s < YEAR => format!("{} months", rounded(MONTH).max(2)),
        _ => match rounded(YEAR) {
            1 => "about 1 year".to_string(),
            n => format!("about {n} years"),
        },
    }
}

/// Render one message as a single line.
#[must_use]
pub fn format_message(msg: &Message, now: DateTime<Utc>) -> String {
    format!(
        "[{}] {}: {}",
        relative_time(msg.timestamp, now),
        msg.user_name,
        msg.content
    )
}

#[must_use]
pub fn format_state(state: ConnectionState) -> String {
    format!("-- {state} --")
}

#[must_use]
pub fn format_error(error: &ErrorSignal) -> String {
    format!("!! {}", error.message)
}
