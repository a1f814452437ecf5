//! Response normalizer
//!
//! Reduces a [`RawPayload`] to one plain-text answer. The `output` value is
//! matched against a closed set of shapes, in order:
//!
//! 1. bare string
//! 2. array of segments: first segment carrying non-empty text wins
//! 3. object exposing a text field directly
//!
//! Within a segment or object, `text` is preferred over `content`. Anything
//! else (null, numbers, missing fields) means "no text here".

use serde_json::{Map, Value};

use crate::catalog::Provider;
use crate::error::GatewayError;
use crate::providers::RawPayload;

/// Field names that may carry text, in preference order
const TEXT_FIELDS: [&str; 2] = ["text", "content"];

/// The recognized `output` shapes
#[derive(Debug, PartialEq)]
pub enum OutputShape<'a> {
    Text(&'a str),
    Segments(&'a [Value]),
    Nested(&'a Map<String, Value>),
    Absent,
}

impl<'a> OutputShape<'a> {
    pub fn of(output: &'a Value) -> Self {
        match output {
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::Segments(items),
            Value::Object(map) => Self::Nested(map),
            _ => Self::Absent,
        }
    }

    /// Extracted text, if this shape holds any
    pub fn text(&self) -> Option<&'a str> {
        match *self {
            Self::Text(s) => non_empty(s),
            Self::Segments(items) => items.iter().find_map(segment_text),
            Self::Nested(map) => field_text(map),
            Self::Absent => None,
        }
    }
}

/// Extract the answer text from a successful payload.
///
/// `provider` only labels the error; the rules are the same for every vendor.
pub fn normalize(provider: Provider, payload: &RawPayload) -> Result<String, GatewayError> {
    OutputShape::of(&payload.output)
        .text()
        .map(str::to_string)
        .ok_or(GatewayError::Normalization { provider })
}

fn segment_text(segment: &Value) -> Option<&str> {
    match segment {
        Value::String(s) => non_empty(s),
        Value::Object(map) => field_text(map),
        _ => None,
    }
}

fn field_text(map: &Map<String, Value>) -> Option<&str> {
    TEXT_FIELDS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str).and_then(non_empty))
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() { None } else { Some(s) }
}
