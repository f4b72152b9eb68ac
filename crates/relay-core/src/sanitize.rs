//! Payload sanitization.
//!
//! Inbound payloads are re-serialized and handed to JavaScript consumers,
//! where object keys like `__proto__` can rewrite the prototype chain of
//! shared objects. Every parsed value passes through
//! [`strip_dangerous_keys`] before delivery, on both the client and the
//! server side.
//!
//! The transform is idempotent: `strip(strip(x)) == strip(x)`.

use serde_json::Value;

/// Object keys removed at every nesting level.
const DANGEROUS_KEYS: &[&str] = &["__proto__", "constructor", "prototype"];

/// Strip dangerous keys from a parsed JSON value, recursively.
///
/// Structure is otherwise preserved: arrays keep their order and length,
/// objects keep every key not in the deny list, scalars pass through
/// untouched. Parser-produced input is acyclic, so plain recursion suffices.
#[must_use]
pub fn strip_dangerous_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !DANGEROUS_KEYS.contains(&key.as_str()))
                .map(|(key, nested)| (key, strip_dangerous_keys(nested)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(strip_dangerous_keys).collect())
        }
        scalar => scalar,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
