//! Turn state types

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

// ============================================================================
// Tool Call Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Running,
    Complete,
}

/// A tool invocation merged with its eventual observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRecord {
    pub tool_call_id: String,
    pub tool_name: String,
    /// Parsed arguments; `{}` until a complete JSON value has arrived
    pub args: Value,
    /// Raw argument text accumulated from `action_args_chunk` frames
    pub raw_args: String,
    pub result: Option<String>,
    pub is_error: Option<bool>,
    pub status: ToolCallStatus,
    pub step: Option<u64>,
}

impl ToolCallRecord {
    fn running(tool_call_id: String, tool_name: &str, step: Option<u64>) -> Self {
        Self {
            tool_call_id,
            tool_name: tool_name.to_string(),
            args: Value::Object(Map::new()),
            raw_args: String::new(),
            result: None,
            is_error: None,
            status: ToolCallStatus::Running,
            step,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ToolCallStatus::Running
    }

    /// Replace the arguments with a complete value from an `action` frame.
    fn set_args(&mut self, args: Value) {
        self.raw_args = args.to_string();
        self.args = args;
    }

    /// Merge one `partial_args` fragment.
    ///
    /// The backend sends cumulative snapshots, so a fragment that extends the
    /// buffer replaces it; anything else is appended.
    fn merge_partial_args(&mut self, partial: &str) {
        if partial.starts_with(self.raw_args.as_str()) {
            partial.clone_into(&mut self.raw_args);
        } else {
            self.raw_args.push_str(partial);
        }
        if let Ok(parsed) = serde_json::from_str::<Value>(&self.raw_args) {
            self.args = parsed;
        }
    }

    fn complete(&mut self, result: String, success: bool) {
        self.result = Some(result);
        self.is_error = Some(!success);
        self.status = ToolCallStatus::Complete;
    }
}

/// Ordered tool-call records for one turn, indexed by tool name.
///
/// At most one record per tool name is running at a time. Observations
/// attach to the most recently created record that is still open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCalls {
    records: Vec<ToolCallRecord>,
    /// tool name -> index of its running record
    running: HashMap<String, usize>,
    /// indices of open records, oldest first
    open: Vec<usize>,
}

impl ToolCalls {
    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&ToolCallRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the index of the running record for `tool` and whether it was just created.
    fn locate_or_create(&mut self, tool: &str, step: Option<u64>) -> (usize, bool) {
        if let Some(&index) = self.running.get(tool) {
            if let Some(record) = self.records.get_mut(index) {
                if record.step.is_none() {
                    record.step = step;
                }
            }
            return (index, false);
        }

        let index = self.records.len();
        let id = format!("{tool}-{index}");
        self.records.push(ToolCallRecord::running(id, tool, step));
        self.running.insert(tool.to_string(), index);
        self.open.push(index);
        (index, true)
    }

    /// Attach an observation to the newest open record. `None` if nothing is open.
    fn complete_latest(&mut self, result: String, success: bool) -> Option<usize> {
        let index = self.open.pop()?;
        let record = self.records.get_mut(index)?;
        record.complete(result, success);
        if self.running.get(&record.tool_name) == Some(&index) {
            self.running.remove(&record.tool_name);
        }
        Some(index)
    }
}

// ============================================================================
// Action Trace
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Thought,
    Action,
    Observation,
}

/// One entry in the turn's agent-action trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub kind: TraceKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,
}

// ============================================================================
// Turn State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Sealed by `end`
    Completed,
    /// Sealed by `error`; partial text was discarded
    Failed,
}

/// A render part of a turn, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPart<'a> {
    Text(&'a str),
    ToolCall(&'a ToolCallRecord),
}

/// The in-progress (or most recently sealed) assistant turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnState {
    text: String,
    tool_calls: ToolCalls,
    trace: Vec<TraceEntry>,
    /// (text length when the tool call was created, tool call index)
    breaks: Vec<(usize, usize)>,
    is_streaming: bool,
    outcome: Option<TurnOutcome>,
    message_id: Option<String>,
}

impl TurnState {
    /// A fresh, streaming turn
    pub fn open(message_id: Option<String>) -> Self {
        Self {
            is_streaming: true,
            message_id,
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tool_calls(&self) -> &ToolCalls {
        &self.tool_calls
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn outcome(&self) -> Option<TurnOutcome> {
        self.outcome
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Text segments interleaved with tool calls, split where each tool call first appeared.
    pub fn parts(&self) -> Vec<TurnPart<'_>> {
        let mut parts = Vec::with_capacity(self.breaks.len() * 2 + 1);
        let mut from = 0;
        for &(offset, index) in &self.breaks {
            if let Some(text) = self.text.get(from..offset).filter(|t| !t.is_empty()) {
                parts.push(TurnPart::Text(text));
            }
            from = from.max(offset);
            if let Some(record) = self.tool_calls.get(index) {
                parts.push(TurnPart::ToolCall(record));
            }
        }
        if let Some(text) = self.text.get(from..).filter(|t| !t.is_empty()) {
            parts.push(TurnPart::Text(text));
        }
        parts
    }

    pub(super) fn push_text(&mut self, content: &str) {
        self.text.push_str(content);
    }

    pub(super) fn push_thought(&mut self, content: &str, step: Option<u64>) {
        self.text.push_str(content);
        self.trace.push(TraceEntry {
            kind: TraceKind::Thought,
            content: content.to_string(),
            tool: None,
            args: None,
            success: None,
            step,
        });
    }

    /// Record an `action`; full args replace anything accumulated so far.
    pub(super) fn record_action(&mut self, tool: &str, args: Option<Value>, step: Option<u64>) {
        let index = self.touch_tool(tool, step);
        if let (Some(args), Some(record)) = (args.clone(), self.tool_calls.records.get_mut(index)) {
            record.set_args(args);
        }
        self.trace.push(TraceEntry {
            kind: TraceKind::Action,
            content: format!("Using tool: {tool}"),
            tool: Some(tool.to_string()),
            args,
            success: None,
            step,
        });
    }

    /// Locate or create the record for `tool` without touching args or trace.
    pub(super) fn record_action_streaming(&mut self, tool: &str, step: Option<u64>) {
        self.touch_tool(tool, step);
    }

    pub(super) fn record_args_chunk(&mut self, tool: &str, partial_args: &str, step: Option<u64>) {
        let index = self.touch_tool(tool, step);
        if let Some(record) = self.tool_calls.records.get_mut(index) {
            record.merge_partial_args(partial_args);
        }
    }

    /// Returns false when there was no open tool call to attach to.
    pub(super) fn record_observation(
        &mut self,
        content: &str,
        success: bool,
        step: Option<u64>,
    ) -> bool {
        if self
            .tool_calls
            .complete_latest(content.to_string(), success)
            .is_none()
        {
            return false;
        }
        self.trace.push(TraceEntry {
            kind: TraceKind::Observation,
            content: content.to_string(),
            tool: None,
            args: None,
            success: Some(success),
            step,
        });
        true
    }

    pub(super) fn seal(&mut self) {
        self.is_streaming = false;
        self.outcome = Some(TurnOutcome::Completed);
    }

    /// Seal after an `error` frame, dropping the partial text.
    pub(super) fn fail(&mut self) {
        self.is_streaming = false;
        self.outcome = Some(TurnOutcome::Failed);
        self.text.clear();
        for entry in &mut self.breaks {
            entry.0 = 0;
        }
    }

    fn touch_tool(&mut self, tool: &str, step: Option<u64>) -> usize {
        let (index, created) = self.tool_calls.locate_or_create(tool, step);
        if created {
            self.breaks.push((self.text.len(), index));
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cumulative_args_snapshots_do_not_duplicate() {
        let mut turn = TurnState::open(None);
        for partial in [r#"{"x""#, r#"{"x": 1"#, r#"{"x": 1}"#] {
            turn.record_args_chunk("tool_a", partial, Some(1));
        }
        let record = &turn.tool_calls().records()[0];
        assert_eq!(record.raw_args, r#"{"x": 1}"#);
        assert_eq!(record.args, json!({"x": 1}));
    }

    #[test]
    fn test_incremental_args_fragments_accumulate() {
        let mut turn = TurnState::open(None);
        for partial in [r#"{"path""#, r#": "a.txt""#, "}"] {
            turn.record_args_chunk("write_file", partial, None);
        }
        let record = &turn.tool_calls().records()[0];
        assert_eq!(record.args, json!({"path": "a.txt"}));
        assert_eq!(turn.tool_calls().len(), 1);
    }

    #[test]
    fn test_incomplete_args_keep_previous_value() {
        let mut turn = TurnState::open(None);
        turn.record_args_chunk("t", r#"{"a""#, None);
        assert_eq!(turn.tool_calls().records()[0].args, json!({}));
    }

    #[test]
    fn test_observation_attaches_to_newest_open_record() {
        let mut turn = TurnState::open(None);
        turn.record_action("a", None, None);
        turn.record_action("b", None, None);
        assert!(turn.record_observation("b done", true, None));

        let records = turn.tool_calls().records();
        assert!(records[0].is_running());
        assert_eq!(records[1].result.as_deref(), Some("b done"));
        assert_eq!(records[1].is_error, Some(false));

        assert!(turn.record_observation("a failed", false, None));
        assert_eq!(turn.tool_calls().records()[0].is_error, Some(true));
        assert!(!turn.record_observation("nothing open", true, None));
    }

    #[test]
    fn test_same_tool_after_completion_creates_new_record() {
        let mut turn = TurnState::open(None);
        turn.record_action("bash", Some(json!({"command": "ls"})), None);
        turn.record_observation("ok", true, None);
        turn.record_action("bash", Some(json!({"command": "pwd"})), None);

        let records = turn.tool_calls().records();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].tool_call_id, records[1].tool_call_id);
        assert!(records[1].is_running());
    }

    #[test]
    fn test_parts_interleave_text_and_tools() {
        let mut turn = TurnState::open(None);
        turn.push_text("Let me look. ");
        turn.record_action("list_files", None, None);
        turn.record_observation("a.txt", true, None);
        turn.push_text("Found it.");

        let parts = turn.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], TurnPart::Text("Let me look. "));
        assert!(matches!(parts[1], TurnPart::ToolCall(r) if r.tool_name == "list_files"));
        assert_eq!(parts[2], TurnPart::Text("Found it."));
    }

    #[test]
    fn test_fail_discards_text_but_keeps_tools() {
        let mut turn = TurnState::open(None);
        turn.push_text("partial");
        turn.record_action("bash", None, None);
        turn.fail();

        assert_eq!(turn.text(), "");
        assert_eq!(turn.outcome(), Some(TurnOutcome::Failed));
        assert_eq!(turn.parts().len(), 1);
    }
}
