// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured extra fields attached to log calls.

use serde_json::{Map, Value};

/// Open key/value bag attached to a log call.
///
/// Values stay typed (strings, numbers, booleans, nested maps) all the way to
/// the sink.
pub type Fields = Map<String, Value>;

/// Maximum number of top-level keys reported in a payload summary.
const MAX_SUMMARY_KEYS: usize = 20;

/// Build a [`Fields`] map from `key => value` pairs.
///
/// # Example
///
/// ```rust
/// use casetrace::fields;
///
/// let f = fields! { "case_id" => "c-42", "attempt" => 3 };
/// assert_eq!(f["attempt"], 3);
/// ```
#[macro_export]
macro_rules! fields {
    () => {
        $crate::logging::Fields::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::logging::Fields::new();
        $(
            map.insert(($key).to_string(), $crate::__serde_json::json!($value));
        )+
        map
    }};
}

/// Describe the shape of a payload without including its contents.
///
/// Produces `{type, size, keys?}`: the JSON type name, the element count (or
/// string length), and for objects the first top-level keys.
pub fn summarize_payload(data: &Value) -> Value {
    let mut summary = Fields::new();
    let (type_name, size) = match data {
        Value::Null => ("null", 0),
        Value::Bool(_) => ("bool", 1),
        Value::Number(_) => ("number", 1),
        Value::String(s) => ("string", s.len()),
        Value::Array(items) => ("array", items.len()),
        Value::Object(map) => ("object", map.len()),
    };
    summary.insert("type".to_string(), Value::from(type_name));
    summary.insert("size".to_string(), Value::from(size));

    if let Value::Object(map) = data {
        let keys: Vec<Value> = map
            .keys()
            .take(MAX_SUMMARY_KEYS)
            .map(|k| Value::from(k.as_str()))
            .collect();
        summary.insert("keys".to_string(), Value::Array(keys));
    }

    Value::Object(summary)
}

/// Merge `extra` into `base`; keys already in `base` win.
pub(crate) fn merge_missing(base: &mut Fields, extra: Fields) {
    for (key, value) in extra {
        base.entry(key).or_insert(value);
    }
}
