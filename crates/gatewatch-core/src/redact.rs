//! Sensitive field masking.
//!
//! Masks values in arbitrary JSON trees and header maps by key-name match.
//! The shape of the input is always preserved: objects keep every key,
//! arrays keep their length and order, and only the value stored under a
//! sensitive key is replaced by a run of `*` characters.
//!
//! ```
//! use gatewatch_core::redact::{mask_value, SensitiveKeys};
//! use serde_json::json;
//!
//! let keys = SensitiveKeys::default();
//! let masked = mask_value(&json!({"user": "ada", "password": "hunter2"}), &keys);
//! assert_eq!(masked, json!({"user": "ada", "password": "*******"}));
//! ```

use crate::exchange::flatten_header;
use http::HeaderMap;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Field names that are always masked, regardless of configuration.
pub const DEFAULT_SENSITIVE_KEYS: &[&str] = &[
    "password",
    "pwd",
    "secret",
    "password_confirmation",
    "passwordConfirmation",
    "cc",
    "card_number",
    "cardNumber",
    "ccv",
    "ssn",
    "credit_score",
    "creditScore",
];

/// Upper bound on the length of a generated mask.
///
/// Values whose string form is longer are masked with exactly this many `*`.
pub const MAX_MASK_LEN: usize = 4096;

/// Immutable set of lower-cased sensitive field names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveKeys {
    keys: HashSet<String>,
}

impl SensitiveKeys {
    /// Build a set from exactly the given names.
    ///
    /// Names are trimmed and lower-cased; blank names are ignored.
    pub fn new(keys: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keys }
    }

    /// Build the built-in set extended with operator-supplied names.
    pub fn with_defaults(extra: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let mut set = Self::new(DEFAULT_SENSITIVE_KEYS);
        set.keys.extend(Self::new(extra).keys);
        set
    }

    /// Check whether a field name is sensitive (case-insensitive).
    pub fn contains(&self, key: &str) -> bool {
        if key.bytes().any(|b| b.is_ascii_uppercase()) || !key.is_ascii() {
            self.keys.contains(&key.to_lowercase())
        } else {
            self.keys.contains(key)
        }
    }

    /// Number of names in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate over the lower-cased names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

impl Default for SensitiveKeys {
    fn default() -> Self {
        Self::with_defaults(std::iter::empty::<&str>())
    }
}

/// Produce a mask for a piece of text: one `*` per character, capped at
/// [`MAX_MASK_LEN`].
pub fn mask_scalar(text: &str) -> String {
    let len = text.chars().count().min(MAX_MASK_LEN);
    "*".repeat(len)
}

/// Return a masked copy of `value`.
pub fn mask_value(value: &Value, keys: &SensitiveKeys) -> Value {
    let mut copy = value.clone();
    mask_in_place(&mut copy, keys);
    copy
}

/// Mask `value` in place, descending into every non-sensitive field.
pub fn mask_in_place(value: &mut Value, keys: &SensitiveKeys) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if keys.contains(key) {
                    redact(field);
                } else {
                    mask_in_place(field, keys);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                mask_in_place(item, keys);
            }
        }
        _ => {}
    }
}

/// Replace a sensitive value with its mask.
///
/// Null and empty strings carry nothing to hide and are left untouched.
fn redact(value: &mut Value) {
    let masked = match value {
        Value::Null => return,
        Value::String(s) if s.is_empty() => return,
        Value::String(s) => mask_scalar(s),
        Value::Bool(b) => mask_scalar(if *b { "true" } else { "false" }),
        Value::Number(n) => mask_scalar(&n.to_string()),
        Value::Array(_) | Value::Object(_) => mask_scalar(&value.to_string()),
    };
    *value = Value::String(masked);
}

/// Flatten and mask a header map.
///
/// Repeated headers are joined with `,`; values of sensitive headers are
/// masked, all other headers pass through verbatim. Each name appears once.
pub fn mask_headers(headers: &HeaderMap, keys: &SensitiveKeys) -> Map<String, Value> {
    let mut masked = Map::new();
    for name in headers.keys() {
        let Some(value) = flatten_header(headers, name.as_str()) else {
            continue;
        };
        let value = if keys.contains(name.as_str()) && !value.is_empty() {
            mask_scalar(&value)
        } else {
            value
        };
        masked.insert(name.as_str().to_string(), Value::String(value));
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_default_set_is_lower_cased() {
        let keys = SensitiveKeys::default();
        assert!(keys.contains("password"));
        assert!(keys.contains("PASSWORD"));
        assert!(keys.contains("cardNumber"));
        assert!(keys.contains("cardnumber"));
        assert!(!keys.contains("username"));
        assert_eq!(keys.len(), DEFAULT_SENSITIVE_KEYS.len());
    }

    #[test]
    fn test_extra_keys_are_unioned() {
        let keys = SensitiveKeys::with_defaults(["Authorization", " token ", ""]);
        assert!(keys.contains("authorization"));
        assert!(keys.contains("token"));
        assert!(keys.contains("ssn"));
        assert_eq!(keys.len(), DEFAULT_SENSITIVE_KEYS.len() + 2);
    }

    #[test]
    fn test_masks_preserve_length() {
        let keys = SensitiveKeys::default();
        let input = json!({
            "password": "hunter2",
            "cc": 4111111111111111u64,
            "ssn": true,
            "pwd": null,
            "secret": "",
            "name": "ada"
        });

        let masked = mask_value(&input, &keys);

        assert_eq!(masked["password"], "*******");
        assert_eq!(masked["cc"], "****************");
        assert_eq!(masked["ssn"], "****");
        assert_eq!(masked["pwd"], Value::Null);
        assert_eq!(masked["secret"], "");
        assert_eq!(masked["name"], "ada");
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let keys = SensitiveKeys::default();
        let input = json!({
            "users": [
                {"name": "a", "Password": "abc"},
                {"name": "b", "profile": {"card_number": "1234"}}
            ]
        });

        let masked = mask_value(&input, &keys);

        assert_eq!(masked["users"][0]["Password"], "***");
        assert_eq!(masked["users"][0]["name"], "a");
        assert_eq!(masked["users"][1]["profile"]["card_number"], "****");
    }

    #[test]
    fn test_sensitive_container_is_masked_whole() {
        let keys = SensitiveKeys::default();
        let masked = mask_value(&json!({"secret": {"a": 1}}), &keys);
        // {"a":1} is seven characters long
        assert_eq!(masked["secret"], "*******");
    }

    #[test]
    fn test_long_values_are_capped() {
        let keys = SensitiveKeys::default();
        let long = "x".repeat(MAX_MASK_LEN + 10);
        let masked = mask_value(&json!({ "secret": long }), &keys);
        assert_eq!(masked["secret"].as_str().map(str::len), Some(MAX_MASK_LEN));
    }

    #[test]
    fn test_multibyte_mask_counts_characters() {
        assert_eq!(mask_scalar("pässwörd"), "********");
    }

    #[test]
    fn test_non_container_root_is_untouched() {
        let keys = SensitiveKeys::default();
        assert_eq!(mask_value(&json!("password"), &keys), json!("password"));
        assert_eq!(mask_value(&json!(42), &keys), json!(42));
    }

    #[test]
    fn test_mask_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());
        headers.insert("secret", "topsecret".parse().unwrap());
        headers.append("accept", "text/html".parse().unwrap());
        headers.append("accept", "application/json".parse().unwrap());

        let masked = mask_headers(&headers, &SensitiveKeys::default());

        assert_eq!(masked["content-type"], "application/json");
        assert_eq!(masked["secret"], "*********");
        assert_eq!(masked["accept"], "text/html,application/json");
    }

    fn key_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("password".to_string()),
            Just("SSN".to_string()),
            Just("cc".to_string()),
            "[a-z]{1,8}",
        ]
    }

    fn json_strategy() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-zA-Z0-9 ]{0,20}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec((key_strategy(), inner), 0..6)
                    .prop_map(|entries| Value::Object(entries.into_iter().collect())),
            ]
        })
    }

    /// Check that `masked` has the shape of `original`, with sensitive
    /// entries replaced by masks of the expected length.
    fn same_shape(original: &Value, masked: &Value, keys: &SensitiveKeys) -> bool {
        match (original, masked) {
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| match b.get(k) {
                        None => false,
                        Some(m) if keys.contains(k) => is_mask_of(v, m),
                        Some(m) => same_shape(v, m, keys),
                    })
            }
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(v, m)| same_shape(v, m, keys))
            }
            (a, b) => a == b,
        }
    }

    fn is_mask_of(original: &Value, masked: &Value) -> bool {
        let expected = match original {
            Value::Null => return masked.is_null(),
            Value::String(s) if s.is_empty() => return masked == original,
            Value::String(s) => s.chars().count(),
            other => other.to_string().chars().count(),
        };
        match masked.as_str() {
            Some(m) => m.len() == expected.min(MAX_MASK_LEN) && m.chars().all(|c| c == '*'),
            None => false,
        }
    }

    proptest! {
        #[test]
        fn prop_mask_preserves_shape(value in json_strategy()) {
            let keys = SensitiveKeys::default();
            let masked = mask_value(&value, &keys);
            prop_assert!(same_shape(&value, &masked, &keys));
        }

        #[test]
        fn prop_mask_is_idempotent(value in json_strategy()) {
            let keys = SensitiveKeys::default();
            let once = mask_value(&value, &keys);
            let twice = mask_value(&once, &keys);
            prop_assert_eq!(once, twice);
        }
    }
}
