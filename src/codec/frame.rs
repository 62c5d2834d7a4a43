//! Wire frames and their normalized in-memory form

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One inbound record from the streaming endpoint, tagged on `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Start {
        #[serde(default)]
        message_id: Option<String>,
    },
    Chunk {
        #[serde(default)]
        content: Option<String>,
    },
    Thought {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        step: Option<u64>,
    },
    Action {
        tool: String,
        #[serde(default)]
        args: Option<Value>,
        #[serde(default)]
        step: Option<u64>,
    },
    /// Sent as soon as the tool name is known, before any argument bytes
    ActionStreaming {
        tool: String,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        step: Option<u64>,
    },
    ActionArgsChunk {
        tool: String,
        #[serde(default)]
        partial_args: Option<String>,
        #[serde(default)]
        step: Option<u64>,
    },
    Observation {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        success: Option<bool>,
        #[serde(default)]
        step: Option<u64>,
    },
    End {
        #[serde(default)]
        message_id: Option<String>,
    },
    Error {
        #[serde(default)]
        content: Option<String>,
    },
    UserMessageSaved {
        #[serde(default)]
        message_id: Option<String>,
    },
}

impl Frame {
    /// Wire name of this frame's `type`
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Start { .. } => "start",
            Frame::Chunk { .. } => "chunk",
            Frame::Thought { .. } => "thought",
            Frame::Action { .. } => "action",
            Frame::ActionStreaming { .. } => "action_streaming",
            Frame::ActionArgsChunk { .. } => "action_args_chunk",
            Frame::Observation { .. } => "observation",
            Frame::End { .. } => "end",
            Frame::Error { .. } => "error",
            Frame::UserMessageSaved { .. } => "user_message_saved",
        }
    }
}

/// Normalized event consumed by the aggregator, in arrival order.
///
/// Mirrors [`Frame`] with optional text defaulted, plus the synthetic
/// `Malformed` event the codec emits for frames it could not decode.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Start {
        message_id: Option<String>,
    },
    Chunk {
        content: String,
    },
    Thought {
        content: String,
        step: Option<u64>,
    },
    Action {
        tool: String,
        args: Option<Value>,
        step: Option<u64>,
    },
    /// Tool name known, arguments still streaming; no trace entry of its own
    ActionStreaming {
        tool: String,
        step: Option<u64>,
    },
    ActionArgsChunk {
        tool: String,
        partial_args: String,
        step: Option<u64>,
    },
    Observation {
        content: String,
        success: bool,
        step: Option<u64>,
    },
    End {
        message_id: Option<String>,
    },
    Error {
        message: Option<String>,
    },
    UserMessageSaved {
        message_id: Option<String>,
    },
    /// A frame that failed to decode; carries the decode error text
    Malformed {
        reason: String,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "start",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Thought { .. } => "thought",
            StreamEvent::Action { .. } => "action",
            StreamEvent::ActionStreaming { .. } => "action_streaming",
            StreamEvent::ActionArgsChunk { .. } => "action_args_chunk",
            StreamEvent::Observation { .. } => "observation",
            StreamEvent::End { .. } => "end",
            StreamEvent::Error { .. } => "error",
            StreamEvent::UserMessageSaved { .. } => "user_message_saved",
            StreamEvent::Malformed { .. } => "malformed",
        }
    }
}

impl From<Frame> for StreamEvent {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Start { message_id } => StreamEvent::Start { message_id },
            Frame::Chunk { content } => StreamEvent::Chunk {
                content: content.unwrap_or_default(),
            },
            Frame::Thought { content, step } => StreamEvent::Thought {
                content: content.unwrap_or_default(),
                step,
            },
            Frame::Action { tool, args, step } => StreamEvent::Action { tool, args, step },
            Frame::ActionStreaming { tool, step, .. } => {
                StreamEvent::ActionStreaming { tool, step }
            }
            Frame::ActionArgsChunk {
                tool,
                partial_args,
                step,
            } => StreamEvent::ActionArgsChunk {
                tool,
                partial_args: partial_args.unwrap_or_default(),
                step,
            },
            // A missing `success` is treated as a failed observation
            Frame::Observation {
                content,
                success,
                step,
            } => StreamEvent::Observation {
                content: content.unwrap_or_default(),
                success: success.unwrap_or(false),
                step,
            },
            Frame::End { message_id } => StreamEvent::End { message_id },
            Frame::Error { content } => StreamEvent::Error { message: content },
            Frame::UserMessageSaved { message_id } => StreamEvent::UserMessageSaved { message_id },
        }
    }
}
