//! Event aggregator
//!
//! Folds the ordered stream of [`StreamEvent`]s into the current turn,
//! Elm-style: a pure [`transition`] plus a list of [`Effect`]s for the
//! session to carry out.

mod effect;
pub mod turn;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{
    Anomaly, Effect, RefreshReason, SessionError, CONNECTION_LOST_MESSAGE, DEFAULT_ERROR_MESSAGE,
};
pub use transition::{transition, TransitionResult};
pub use turn::{
    ToolCallRecord, ToolCallStatus, ToolCalls, TraceEntry, TraceKind, TurnOutcome, TurnPart,
    TurnState,
};

use crate::codec::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No open turn (never started, or sealed)
    Idle,
    Streaming,
}

/// Owns the live turn of one session
#[derive(Debug, Default)]
pub struct Aggregator {
    turn: Option<TurnState>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turn(&self) -> Option<&TurnState> {
        self.turn.as_ref()
    }

    pub fn phase(&self) -> Phase {
        match &self.turn {
            Some(turn) if turn.is_streaming() => Phase::Streaming,
            _ => Phase::Idle,
        }
    }

    /// Apply one event and return the effects to execute.
    pub fn apply(&mut self, event: StreamEvent) -> Vec<Effect> {
        let result = transition(self.turn.take(), event);
        self.turn = result.turn;
        result.effects
    }
}

/// Fold an ordered event sequence from an idle aggregator.
pub fn replay(events: impl IntoIterator<Item = StreamEvent>) -> (Option<TurnState>, Vec<Effect>) {
    let mut aggregator = Aggregator::new();
    let mut effects = Vec::new();
    for event in events {
        effects.extend(aggregator.apply(event));
    }
    (aggregator.turn, effects)
}
