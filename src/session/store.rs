//! Reactive per-session state
//!
//! One writer (the session driver), any number of readers. Readers get a
//! `watch` receiver and only ever see whole snapshots.

use super::history::HistoryMessage;
use crate::aggregator::{SessionError, ToolCallRecord, TraceEntry, TurnOutcome, TurnState};
use crate::transport::ConnectionStatus;
use tokio::sync::watch;

/// Everything a view renders for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: ConnectionStatus,
    /// Projection of the live (or last sealed) turn; ephemeral
    pub turn: Option<TurnState>,
    /// Finalized messages; the durable record
    pub messages: Vec<HistoryMessage>,
    pub error: Option<SessionError>,
    /// Newest history generation requested
    pub history_requested: u64,
    /// Generation of the history currently in `messages`
    pub history_revision: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Idle,
            turn: None,
            messages: Vec::new(),
            error: None,
            history_requested: 0,
            history_revision: 0,
        }
    }
}

impl SessionSnapshot {
    pub fn streaming_message(&self) -> &str {
        self.turn.as_ref().map_or("", TurnState::text)
    }

    pub fn is_streaming(&self) -> bool {
        self.turn.as_ref().is_some_and(TurnState::is_streaming)
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        self.turn
            .as_ref()
            .map(|turn| turn.tool_calls().records())
            .unwrap_or_default()
    }

    pub fn trace(&self) -> &[TraceEntry] {
        self.turn.as_ref().map(TurnState::trace).unwrap_or_default()
    }

    pub fn turn_outcome(&self) -> Option<TurnOutcome> {
        self.turn.as_ref().and_then(TurnState::outcome)
    }

    /// True while a requested history read has not landed yet
    pub fn needs_history_refresh(&self) -> bool {
        self.history_requested > self.history_revision
    }
}

#[derive(Debug)]
pub struct SessionStore {
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.tx.send_if_modified(|snapshot| {
            let changed = snapshot.status != status;
            snapshot.status = status;
            changed
        });
    }

    pub(crate) fn publish_turn(&self, turn: Option<&TurnState>) {
        self.tx.send_modify(|snapshot| snapshot.turn = turn.cloned());
    }

    pub(crate) fn set_error(&self, error: SessionError) {
        self.tx.send_modify(|snapshot| snapshot.error = Some(error));
    }

    pub(crate) fn clear_error(&self) {
        self.tx.send_if_modified(|snapshot| snapshot.error.take().is_some());
    }

    /// Raise the refresh signal; returns the new generation
    pub(crate) fn request_history(&self) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|snapshot| {
            snapshot.history_requested += 1;
            generation = snapshot.history_requested;
        });
        generation
    }

    /// Install a history read unless a newer one was requested since.
    /// Returns false for a stale result.
    pub(crate) fn apply_history(&self, generation: u64, messages: Vec<HistoryMessage>) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if generation < snapshot.history_requested || generation <= snapshot.history_revision {
                return false;
            }
            snapshot.messages = messages;
            snapshot.history_revision = generation;
            true
        })
    }

    /// A failed read settles the signal for its generation, keeping the old list
    pub(crate) fn settle_history(&self, generation: u64) {
        self.tx.send_if_modified(|snapshot| {
            if generation < snapshot.history_requested || generation <= snapshot.history_revision {
                return false;
            }
            snapshot.history_revision = generation;
            true
        });
    }
}
