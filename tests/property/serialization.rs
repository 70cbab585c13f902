//! Property-based codec tests.
//!
//! Uses proptest to verify:
//! 1. Any valid message frame decodes to the same fields.
//! 2. History bodies always come back in exact reverse wire order.
//! 3. Arbitrary text never causes a panic in `decode_message` or `decode_history`.
//! 4. Outbound frames always carry exactly `content` and `userName`.

use chrono::{DateTime, TimeZone, Utc};
use parley_proto::codec;
use parley_proto::message::{Message, OutboundMessage};
use proptest::prelude::*;

/// Strategy for timestamps between 2000-01-01 and 2100-01-01, whole milliseconds.
fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800_000i64..4_102_444_800_000i64)
        .prop_filter_map("in range", |ms| Utc.timestamp_millis_opt(ms).single())
}

/// Strategy for non-empty field text.
fn arb_text() -> impl Strategy<Value = String> {
    "[^\x00]{1,256}"
}

/// Strategy for valid messages.
fn arb_message() -> impl Strategy<Value = Message> {
    (arb_text(), arb_text(), arb_timestamp())
        .prop_map(|(user, content, ts)| Message::new(user, content, ts))
}

proptest! {
    #[test]
    fn valid_frame_decodes_to_same_fields(msg in arb_message()) {
        let frame = codec::encode_message(&msg).unwrap();
        let decoded = codec::decode_message(&frame).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn history_is_reversed(newest_first in prop::collection::vec(arb_message(), 0..32)) {
        let body = codec::encode_history(newest_first.clone()).unwrap();
        let oldest_first = codec::decode_history(body.as_bytes()).unwrap();
        let mut expected = newest_first;
        expected.reverse();
        prop_assert_eq!(oldest_first, expected);
    }

    #[test]
    fn arbitrary_text_never_panics(text in ".{0,512}") {
        let _ = codec::decode_message(&text);
        let _ = codec::decode_history(text.as_bytes());
    }

    #[test]
    fn arbitrary_bytes_never_panic_history(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode_history(&bytes);
    }

    #[test]
    fn outbound_frame_shape(user in arb_text(), content in arb_text()) {
        let frame = codec::encode_outbound(&OutboundMessage::new(user.clone(), content.clone())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let obj = value.as_object().unwrap();
        prop_assert_eq!(obj.len(), 2);
        prop_assert_eq!(obj["userName"].as_str().unwrap(), user.as_str());
        prop_assert_eq!(obj["content"].as_str().unwrap(), content.as_str());
    }
}
