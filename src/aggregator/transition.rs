//! Pure turn transition function
//!
//! Folds one [`StreamEvent`] into the current turn. No I/O happens here;
//! everything observable leaves as an [`Effect`].

use super::effect::{Anomaly, Effect, RefreshReason, SessionError};
use super::turn::TurnState;
use crate::codec::StreamEvent;

/// Result of a turn transition
#[derive(Debug)]
pub struct TransitionResult {
    pub turn: Option<TurnState>,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(turn: Option<TurnState>) -> Self {
        Self {
            turn,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Pure transition function
///
/// Takes the current turn by value so the text buffer is extended in place
/// rather than copied on every frame.
pub fn transition(turn: Option<TurnState>, event: StreamEvent) -> TransitionResult {
    match (turn, event) {
        // ============================================================
        // Frames that do not need an open turn
        // ============================================================
        (turn, StreamEvent::Malformed { reason }) => TransitionResult::new(turn)
            .with_effect(Effect::anomaly(Anomaly::MalformedFrame { reason })),

        (previous, StreamEvent::Start { message_id }) => {
            let mut result = TransitionResult::new(Some(TurnState::open(message_id)));
            if let Some(discarded) = previous.filter(TurnState::is_streaming) {
                result = result.with_effect(Effect::anomaly(Anomaly::TurnRestarted {
                    discarded_chars: discarded.text().chars().count(),
                    discarded_tool_calls: discarded.tool_calls().len(),
                }));
            }
            result
                .with_effect(Effect::ClearError)
                .with_effect(Effect::PublishTurn)
        }

        (turn, StreamEvent::UserMessageSaved { message_id }) => TransitionResult::new(turn)
            .with_effect(Effect::refresh(RefreshReason::UserMessageSaved, message_id)),

        // ============================================================
        // Streaming turn
        // ============================================================
        (Some(mut turn), StreamEvent::Chunk { content }) if turn.is_streaming() => {
            turn.push_text(&content);
            TransitionResult::new(Some(turn)).with_effect(Effect::PublishTurn)
        }

        (Some(mut turn), StreamEvent::Thought { content, step }) if turn.is_streaming() => {
            turn.push_thought(&content, step);
            TransitionResult::new(Some(turn)).with_effect(Effect::PublishTurn)
        }

        (Some(mut turn), StreamEvent::Action { tool, args, step }) if turn.is_streaming() => {
            turn.record_action(&tool, args, step);
            TransitionResult::new(Some(turn)).with_effect(Effect::PublishTurn)
        }

        (Some(mut turn), StreamEvent::ActionStreaming { tool, step }) if turn.is_streaming() => {
            turn.record_action_streaming(&tool, step);
            TransitionResult::new(Some(turn)).with_effect(Effect::PublishTurn)
        }

        (
            Some(mut turn),
            StreamEvent::ActionArgsChunk {
                tool,
                partial_args,
                step,
            },
        ) if turn.is_streaming() => {
            turn.record_args_chunk(&tool, &partial_args, step);
            TransitionResult::new(Some(turn)).with_effect(Effect::PublishTurn)
        }

        (
            Some(mut turn),
            StreamEvent::Observation {
                content,
                success,
                step,
            },
        ) if turn.is_streaming() => {
            if turn.record_observation(&content, success, step) {
                TransitionResult::new(Some(turn)).with_effect(Effect::PublishTurn)
            } else {
                TransitionResult::new(Some(turn))
                    .with_effect(Effect::anomaly(Anomaly::OrphanObservation))
            }
        }

        (Some(mut turn), StreamEvent::End { message_id }) if turn.is_streaming() => {
            turn.seal();
            TransitionResult::new(Some(turn))
                .with_effect(Effect::PublishTurn)
                .with_effect(Effect::refresh(RefreshReason::TurnEnded, message_id))
        }

        (Some(mut turn), StreamEvent::Error { message }) if turn.is_streaming() => {
            turn.fail();
            TransitionResult::new(Some(turn))
                .with_effect(Effect::SetError(SessionError::from_frame(message)))
                .with_effect(Effect::PublishTurn)
        }

        // ============================================================
        // No open turn
        // ============================================================

        // History may still have changed even if we missed the `start`
        (turn, StreamEvent::End { message_id }) => TransitionResult::new(turn)
            .with_effect(Effect::anomaly(Anomaly::EndWithoutStart))
            .with_effect(Effect::refresh(RefreshReason::TurnEnded, message_id)),

        // Errors reported before any turn (e.g. unknown session) still surface
        (turn, StreamEvent::Error { message }) => TransitionResult::new(turn)
            .with_effect(Effect::SetError(SessionError::from_frame(message))),

        (turn, event) => TransitionResult::new(turn).with_effect(Effect::anomaly(
            Anomaly::FrameOutsideTurn { kind: event.kind() },
        )),
    }
}
