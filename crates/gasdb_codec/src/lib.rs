//! # GASDB Codec
//!
//! Document value model and tagged-JSON codec for GASDB.
//!
//! Documents are JSON-shaped values with one extension: dates are
//! first-class instants. On the wire they travel as ordinary JSON with
//! a `__type` discriminator tag, so any JSON-speaking backend can store
//! them and the decoder can revive them without loss:
//!
//! ```text
//! {"joined": {"__type": "Date", "value": "2024-03-15T09:30:00.000Z"}}
//! ```
//!
//! ## Guarantees
//!
//! - `from_json(to_json(v))` is structurally equal to `v` for every
//!   value with finite numbers.
//! - Object key order survives the round trip.
//! - Non-finite numbers never reach the wire.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

/// Reserved key carrying the type discriminator in the wire form.
pub const TYPE_KEY: &str = "__type";

pub use decoder::{decode_date, from_json, from_json_str};
pub use encoder::{to_json, to_json_string};
pub use error::{CodecError, CodecResult};
pub use value::Value;

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-1_000_000i64..1_000_000).prop_map(Value::from),
            (-1_000_000i64..1_000_000).prop_map(|n| Value::Number(n as f64 / 64.0)),
            "[a-z]{0,8}".prop_map(Value::from),
            (0i64..4_000_000_000).prop_map(|ms| {
                Value::Date(Utc.timestamp_millis_opt(ms).unwrap())
            }),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..4)
                    .prop_map(|pairs| Value::object(
                        pairs.into_iter().map(|(k, v)| (k, v)).collect()
                    )),
            ]
        })
    }

    proptest! {
        #[test]
        fn json_round_trip(value in arb_value()) {
            let encoded = to_json(&value).unwrap();
            let decoded = from_json(&encoded).unwrap();
            prop_assert!(decoded.deep_eq(&value));
        }

        #[test]
        fn string_round_trip(value in arb_value()) {
            let text = to_json_string(&value).unwrap();
            let decoded = from_json_str(&text).unwrap();
            prop_assert!(decoded.deep_eq(&value));
        }
    }
}
