//! Property-based test generators.

use proptest::prelude::*;
use restwire_protocol::Value;

/// Strategy producing arbitrary scalar values.
pub fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1.0e9..1.0e9f64).prop_map(Value::Double),
        arb_text().prop_map(Value::Text),
    ]
}

/// Strategy producing printable text, including characters every
/// escaping profile must handle (quotes, spaces, reserved punctuation).
pub fn arb_text() -> impl Strategy<Value = String> {
    "\\PC{0,32}"
}

/// Strategy producing non-empty key text.
pub fn arb_key_text() -> impl Strategy<Value = String> {
    "\\PC{1,16}"
}
