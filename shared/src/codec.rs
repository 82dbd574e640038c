//! JSON codec for command and reply bodies
//!
//! Inbound bodies are UTF-8 JSON objects:
//! ```text
//! {"Action": "restart" | "shutdown", "CorrelationId": "<opaque>"}
//! ```
//! Field names match case-insensitively and are applied in document order, so
//! a repeated field takes its last value. Unknown fields are ignored, `null`
//! leaves a field at its default, and a `null` body is an empty command.
//!
//! Replies are rendered as:
//! ```text
//! {"error": <true|false>, "correlationId": "<opaque>"}
//! ```

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::{Command, Reply};

pub const ACTION_FIELD: &str = "Action";
pub const CORRELATION_ID_FIELD: &str = "CorrelationId";

/// Errors that can occur while decoding an inbound command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Body is not JSON, or not a JSON object of the expected shape.
    ///
    /// `correlation_id` holds whatever could be recovered from the body so the
    /// failure reply can still be correlated (empty when nothing was found).
    #[error("Malformed command: {reason}")]
    Malformed {
        reason: String,
        correlation_id: String,
    },
}

impl CodecError {
    /// Correlation ID recovered from the malformed body
    pub fn correlation_id(&self) -> &str {
        match self {
            CodecError::Malformed { correlation_id, .. } => correlation_id,
        }
    }
}

/// Decode a command from a message body
pub fn decode_command(body: &[u8]) -> Result<Command, CodecError> {
    let decoded: Decoded = serde_json::from_slice(body).map_err(|e| CodecError::Malformed {
        reason: e.to_string(),
        correlation_id: String::new(),
    })?;

    match decoded.type_error {
        None => Ok(decoded.command),
        Some(reason) => Err(CodecError::Malformed {
            reason,
            correlation_id: decoded.command.correlation_id,
        }),
    }
}

/// Render a reply body
pub fn encode_reply(reply: &Reply) -> String {
    // Serializing a String cannot fail
    let id = serde_json::to_string(&reply.correlation_id).unwrap_or_else(|_| "\"\"".into());
    format!("{{\"error\": {}, \"correlationId\": {}}}", reply.error, id)
}

/// A command plus the first field that had the wrong type.
///
/// Decoding keeps going past a badly typed field so the correlation ID can
/// still be recovered for the failure reply.
#[derive(Debug, Default)]
struct Decoded {
    command: Command,
    type_error: Option<String>,
}

enum Field {
    Action,
    CorrelationId,
}

impl Field {
    fn matching(key: &str) -> Option<Self> {
        if key.eq_ignore_ascii_case(ACTION_FIELD) {
            Some(Field::Action)
        } else if key.eq_ignore_ascii_case(CORRELATION_ID_FIELD) {
            Some(Field::CorrelationId)
        } else {
            None
        }
    }
}

impl<'de> Deserialize<'de> for Decoded {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecodedVisitor)
    }
}

struct DecodedVisitor;

impl<'de> Visitor<'de> for DecodedVisitor {
    type Value = Decoded;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a command object or null")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Decoded, E> {
        Ok(Decoded::default())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Decoded, A::Error> {
        let mut decoded = Decoded::default();

        while let Some(key) = map.next_key::<String>()? {
            let Some(field) = Field::matching(&key) else {
                map.next_value::<IgnoredAny>()?;
                continue;
            };

            match map.next_value::<Value>()? {
                Value::Null => {}
                Value::String(value) => match field {
                    Field::Action => decoded.command.action = value,
                    Field::CorrelationId => decoded.command.correlation_id = value,
                },
                other => {
                    if decoded.type_error.is_none() {
                        decoded.type_error =
                            Some(format!("field {:?} must be a string, got {}", key, other));
                    }
                }
            }
        }

        Ok(decoded)
    }
}
