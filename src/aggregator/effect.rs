//! Effects produced by turn transitions

use thiserror::Error;

/// Shown when an `error` frame carries no message
pub const DEFAULT_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Shown when reconnect attempts are exhausted
pub const CONNECTION_LOST_MESSAGE: &str = "connection lost";

/// The single user-visible error of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub message: String,
}

impl SessionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// From the `content` of an `error` frame
    pub fn from_frame(content: Option<String>) -> Self {
        match content {
            Some(message) if !message.is_empty() => Self::new(message),
            _ => Self::new(DEFAULT_ERROR_MESSAGE),
        }
    }

    pub fn connection_lost() -> Self {
        Self::new(CONNECTION_LOST_MESSAGE)
    }
}

/// Why finalized history should be re-read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// `end`: the assistant turn has been persisted
    TurnEnded,
    /// `user_message_saved`: the user's message has been persisted
    UserMessageSaved,
}

impl RefreshReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshReason::TurnEnded => "turn_ended",
            RefreshReason::UserMessageSaved => "user_message_saved",
        }
    }
}

/// Protocol anomalies. Recovered locally, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },
    #[error("turn restarted before end; discarded {discarded_chars} chars and {discarded_tool_calls} tool calls")]
    TurnRestarted {
        discarded_chars: usize,
        discarded_tool_calls: usize,
    },
    #[error("observation with no open tool call")]
    OrphanObservation,
    #[error("`{kind}` frame outside of a turn")]
    FrameOutsideTurn { kind: &'static str },
    #[error("`end` frame with no open turn")]
    EndWithoutStart,
}

/// Effects to be executed by the session after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Turn projection changed; republish it
    PublishTurn,

    /// Re-read finalized messages from the history collaborator
    RefreshHistory {
        reason: RefreshReason,
        message_id: Option<String>,
    },

    SetError(SessionError),

    ClearError,

    /// Log and continue
    Anomaly(Anomaly),
}

impl Effect {
    pub fn refresh(reason: RefreshReason, message_id: Option<String>) -> Self {
        Effect::RefreshHistory { reason, message_id }
    }

    pub fn anomaly(anomaly: Anomaly) -> Self {
        Effect::Anomaly(anomaly)
    }
}
