//! The envelope wrapping every message carried over the wire.
//!
//! [`Envelope`] is the only wire unit: `type` is an opaque routing string,
//! `payload` is any JSON value, `timestamp` is optional epoch milliseconds.
//! Inbound text is decoded through [`Envelope::decode`], which sanitizes the
//! payload and rejects frames without a string `type`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sanitize::strip_dangerous_keys;

/// A single transport message.
///
/// ```json
/// { "type": "agent.output", "payload": {"text": "hi"}, "timestamp": 1754400000000 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing string, opaque to the transport.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Arbitrary JSON payload. Defaults to `null` when absent.
    #[serde(default)]
    pub payload: Value,
    /// Epoch milliseconds. Omitted from the wire when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Why an inbound text frame could not be decoded.
///
/// Callers drop undecodable frames silently; the variants exist so the drop
/// can be logged with a reason.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame was not valid JSON.
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    /// The frame parsed, but is not an object with a string `type` field.
    #[error("missing string `type` field")]
    MissingType,
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        }
    }

    /// Serialize to a wire frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode an inbound text frame.
    ///
    /// The parsed value is sanitized before validation, so a well-formed
    /// envelope never carries a `__proto__`/`constructor`/`prototype` key at
    /// any depth.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let value = strip_dangerous_keys(value);

        let has_type = value
            .as_object()
            .is_some_and(|obj| obj.get("type").is_some_and(Value::is_string));
        if !has_type {
            return Err(DecodeError::MissingType);
        }

        serde_json::from_value(value).map_err(DecodeError::Parse)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
