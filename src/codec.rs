//! Frame codec
//!
//! Decodes inbound JSON frames into [`Frame`]s and encodes the single
//! outbound record shape. A decode failure never ends the connection; the
//! caller turns it into a [`StreamEvent::Malformed`] for the aggregator.

mod frame;

pub use frame::{Frame, StreamEvent};

use serde_json::{json, Value};
use thiserror::Error;

/// Known inbound `type` values
const FRAME_TYPES: &[&str] = &[
    "start",
    "chunk",
    "thought",
    "action",
    "action_streaming",
    "action_args_chunk",
    "observation",
    "end",
    "error",
    "user_message_saved",
];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame has no string `type` field")]
    MissingType,
    #[error("Unknown frame type: {0}")]
    UnknownType(String),
    #[error("Invalid `{kind}` frame: {source}")]
    InvalidFrame {
        kind: String,
        source: serde_json::Error,
    },
}

/// Decode one raw inbound frame.
pub fn decode(raw: &str) -> Result<Frame, DecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    if !FRAME_TYPES.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|source| DecodeError::InvalidFrame { kind, source })
}

/// Decode straight into a [`StreamEvent`], folding failures into `Malformed`.
pub fn decode_event(raw: &str) -> StreamEvent {
    match decode(raw) {
        Ok(frame) => frame.into(),
        Err(e) => StreamEvent::Malformed {
            reason: e.to_string(),
        },
    }
}

/// Encode a user message as `{"type":"message","content":...}`.
pub fn encode(user_text: &str) -> String {
    json!({
        "type": "message",
        "content": user_text,
    })
    .to_string()
}
